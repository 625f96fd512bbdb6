//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::job::JobStore;
use crate::ratelimit::RateLimiter;
use crate::tools::{tool_defs, ToolDef};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub limiter: Arc<RateLimiter>,
    pub tools: Arc<HashMap<String, ToolDef>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let tools = tool_defs(&config.tools_root);
        let limiter = RateLimiter::new(
            config.rate_window,
            config.rate_get_max,
            config.rate_post_max,
        );
        Self {
            config: Arc::new(config),
            store: Arc::new(JobStore::new()),
            limiter: Arc::new(limiter),
            tools: Arc::new(tools),
        }
    }
}
