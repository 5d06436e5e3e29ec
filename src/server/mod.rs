pub mod api;
pub mod websocket;

use crate::agent::ChatAgent;
use crate::cli::Args;
use crate::session::SessionRegistry;
use log::info;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    addr: String,
    agent: Arc<ChatAgent>,
    sessions: SessionRegistry,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<ChatAgent>, args: Args) -> Self {
        Self {
            addr,
            agent,
            sessions: SessionRegistry::new(),
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.start_session_sweeper();
        self.start_http_server().await?;
        self.start_ws_server().await?;
        Ok(())
    }

    fn start_session_sweeper(&self) {
        let sessions = self.sessions.clone();
        let ttl = Duration::from_secs(self.args.session_ttl_secs);
        let period = ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
        info!("Idle sessions expire after {}s", ttl.as_secs());

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = sessions.evict_idle(ttl).await;
                if evicted > 0 {
                    info!("Evicted {} idle session(s), {} left", evicted, sessions.len().await);
                }
            }
        });
    }

    async fn start_http_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = api::AppState {
            agent: Arc::clone(&self.agent),
            sessions: self.sessions.clone(),
            ws_url: format!("ws://{}", self.addr),
        };
        api::start_http_server(self.args.http_port, state, self.args.max_upload_bytes).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            Arc::clone(&self.agent),
            self.sessions.clone(),
            self.args.server_api_key.clone()
        ).await
    }
}
