use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:7777")]
    pub server_addr: String,

    /// Base URL of the OpenAI-compatible chat completion API.
    #[arg(
        long,
        env = "CHAT_BASE_URL",
        default_value = "https://dashscope.aliyuncs.com/compatible-mode/v1"
    )]
    pub chat_base_url: String,

    /// Base URL of the asynchronous image generation API.
    #[arg(long, env = "IMAGE_BASE_URL", default_value = "https://dashscope.aliyuncs.com/api/v1")]
    pub image_base_url: String,

    /// API key attached to every upstream request.
    #[arg(long, env = "UPSTREAM_API_KEY", default_value = "")]
    pub upstream_api_key: String,

    /// Model identifier sent with chat completion requests.
    #[arg(long, env = "CHAT_MODEL", default_value = "qwen-max-0428")]
    pub chat_model: String,

    /// Connect timeout in seconds for upstream requests.
    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT", default_value = "10")]
    pub upstream_connect_timeout: u64,

    /// Total timeout in seconds for the image and task pass-through calls.
    #[arg(long, env = "PROXY_TIMEOUT", default_value = "30")]
    pub proxy_timeout: u64,

    /// Directory of static frontend files served at the root path.
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: String,

    /// Maximum chat requests per second before the relay sheds with 429.
    #[arg(long, env = "CHAT_RATE_LIMIT", default_value = "10")]
    pub chat_rate_limit: u32,
}
