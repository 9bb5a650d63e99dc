//! Shared process bootstrap (spec ambient "Configuration" + "Persistent state
//! layout"): opens the SQLite pool, runs migrations, and constructs the
//! router/tools/client/store set every binary (`hearth`, `hearth-gateway`,
//! `hearth-compat-gateway`) needs.
//!
//! Grounded in the teacher's `bin/gateway.rs` `AppState::new` construction
//! sequence, generalized from one process's state into a reusable bootstrap
//! shared by three binaries.

use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{OpenRouterClient, Persona};
use crate::config::{CapabilityTagConfig, Config};
use crate::database::{
    open_pool, run_migrations, AnticipationStore, CheckpointStore, ConversationStore,
    ScheduledTaskStore, TaskStore, UsageStore,
};
use crate::error::{Error, Result};
use crate::router::ModelRouter;
use crate::tools::{
    ActivateCapabilityTool, DelegateTool, DropCapabilityTool, ReadFileTool, SendMessageToUserTool,
    TaskCreateTool, TaskListTool, TaskUpdateTool, ToolRegistry, WriteFileTool,
};

/// Everything the trigger bridges and HTTP surfaces share, built once at
/// process startup.
pub struct Runtime {
    pub config: Config,
    pub llm_client: Arc<OpenRouterClient>,
    pub router: Arc<ModelRouter>,
    pub tools: Arc<ToolRegistry>,
    pub conversations: Arc<ConversationStore>,
    pub anticipations: Arc<AnticipationStore>,
    pub scheduled_tasks: Arc<ScheduledTaskStore>,
    pub agent_tasks: Arc<TaskStore>,
    pub usage: Arc<UsageStore>,
    pub checkpoints: Arc<CheckpointStore>,
    pub persona: Arc<Persona>,
    pub capability_tags: Arc<Vec<CapabilityTagConfig>>,
    pub talents_dir: PathBuf,
}

impl Runtime {
    /// Open the database, run migrations, and build every shared component
    /// from configuration.
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let pool = open_pool(&config.storage.sqlite).await?;
        run_migrations(&pool).await?;

        let openrouter_config = config
            .provider
            .openrouter
            .clone()
            .ok_or_else(|| Error::Config("provider.openrouter is required".to_string()))?;
        let llm_client = Arc::new(OpenRouterClient::new(openrouter_config)?);

        let router = Arc::new(ModelRouter::new(
            config.router.models.clone(),
            config.router.local_first,
            config.router.audit_ring_size,
            config.provider.failover.clone(),
        ));

        let mut tools = ToolRegistry::new();
        tools.register(ReadFileTool::new(config.agent.workspace.clone()));
        tools.register(WriteFileTool::new(config.agent.workspace.clone()));
        tools.register(SendMessageToUserTool);
        tools.register(DropCapabilityTool);
        tools.register(ActivateCapabilityTool);
        tools.register(TaskCreateTool::new(TaskStore::new(pool.clone())));
        tools.register(TaskListTool::new(TaskStore::new(pool.clone())));
        tools.register(TaskUpdateTool::new(TaskStore::new(pool.clone())));
        tools.register(DelegateTool::new(TaskStore::new(pool.clone())));

        let persona_path = config
            .agent
            .system_prompt_file
            .clone()
            .unwrap_or_else(|| config.agent.workspace.join(crate::agent::prompts::PERSONA_FILE_PATH));
        let persona = Arc::new(Persona::load_or_default(&persona_path));

        let talents_dir = config.agent.workspace.join("talents");

        Ok(Runtime {
            llm_client,
            router,
            tools: Arc::new(tools),
            conversations: Arc::new(ConversationStore::new(pool.clone())),
            anticipations: Arc::new(AnticipationStore::new(pool.clone())),
            scheduled_tasks: Arc::new(ScheduledTaskStore::new(pool.clone())),
            agent_tasks: Arc::new(TaskStore::new(pool.clone())),
            usage: Arc::new(UsageStore::new(pool.clone())),
            checkpoints: Arc::new(CheckpointStore::new(pool)),
            persona,
            capability_tags: Arc::new(config.capabilities.tags.clone()),
            talents_dir,
            config,
        })
    }
}
