pub mod cli;
pub mod client;
pub mod error;
pub mod models;
pub mod server;
pub mod sse;
pub mod upstream;

use cli::Args;
use error::Result;
use server::Server;
use upstream::DashScopeClient;

pub async fn run(args: Args) -> Result<()> {
    let upstream = DashScopeClient::new_arc(&args)?;
    let server = Server::new(args.server_addr.clone(), upstream, args);
    server.run().await
}
