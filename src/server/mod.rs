pub mod api;

use crate::cli::Args;
use crate::error::Result;
use crate::upstream::UpstreamClient;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Server {
    addr: String,
    upstream: Arc<dyn UpstreamClient>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, upstream: Arc<dyn UpstreamClient>, args: Args) -> Self {
        Self { addr, upstream, args }
    }

    pub async fn run(&self) -> Result<()> {
        let app = api::router(self.upstream.clone(), &self.args);
        let listener = TcpListener::bind(&self.addr).await?;
        info!("Relay listening on: http://{}", self.addr);
        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}
