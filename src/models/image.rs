use serde::Deserialize;

/// Lifecycle of an asynchronous image-generation task, as reported by the
/// upstream task endpoint. Statuses this crate does not know about map to
/// `Unknown` and keep the polling loop alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Response to an image-synthesis submission. Only the task id is read; the
/// rest of the envelope passes through untouched.
#[derive(Debug, Deserialize)]
pub struct TaskCreated {
    pub output: Option<TaskHandle>,
}

#[derive(Debug, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Response to a task-status poll.
#[derive(Debug, Deserialize)]
pub struct TaskPoll {
    pub output: Option<TaskOutput>,
}

#[derive(Debug, Deserialize)]
pub struct TaskOutput {
    pub task_status: TaskStatus,
    #[serde(default)]
    pub results: Vec<TaskResult>,
}

#[derive(Debug, Deserialize)]
pub struct TaskResult {
    pub url: Option<String>,
}
