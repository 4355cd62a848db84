//! 程序引导
//!
//! 配置 → 日志 → 结果表 → 数据源与模型 → 执行命令。
//! 收到 SIGINT/SIGTERM/SIGQUIT 时尽力保存结果表后退出。

pub mod config;

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::build_info;
use crate::inputs::analytics_users::load_analytics_users;
use crate::inputs::pinecone::PineconeSummarySource;
use crate::inputs::sqlite::SqliteRecordSource;
use crate::inputs::Inputs;
use crate::insight::{InsightOptions, UserInsights};
use crate::llm::OpenAiModel;
use crate::outputs::csv_snapshot::CsvSnapshot;
use crate::outputs::mixpanel::MixpanelUploader;
use crate::outputs::ResultStore;
use crate::util::config::Config;
use crate::util::http_client::{HttpClient, HttpClientConfig};
use self::config::ConfigManager;

/// 记录库连接池上限
const MAX_RECORD_CONNECTIONS: usize = 32;

pub const USAGE: &str = "usage: user-insight [run-all | run <user_id>... | run-file <path> | cluster | upload | version]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 处理待处理列表中的全部用户
    RunAll,
    /// 处理命令行给出的用户
    Run(Vec<String>),
    /// 处理另一份用户列表
    RunFile(PathBuf),
    /// 归类已有结果的职业和行业
    Cluster,
    /// 把已有结果推送到画像平台
    Upload,
    Version,
}

impl Command {
    /// 解析命令行参数（不含程序名），无参数时为 `run-all`
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            None | Some("run-all") => Command::RunAll,
            Some("run") => {
                let user_ids: Vec<String> = args.filter(|id| !id.trim().is_empty()).collect();
                if user_ids.is_empty() {
                    bail!("run 需要至少一个用户ID\n{USAGE}");
                }
                Command::Run(user_ids)
            }
            Some("run-file") => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("run-file 需要文件路径\n{USAGE}"))?;
                Command::RunFile(PathBuf::from(path))
            }
            Some("cluster") => Command::Cluster,
            Some("upload") => Command::Upload,
            Some("version") | Some("--version") | Some("-V") => Command::Version,
            Some(other) => bail!("未知命令: {other}\n{USAGE}"),
        };
        Ok(command)
    }

    fn name(&self) -> &'static str {
        match self {
            Command::RunAll => "run-all",
            Command::Run(_) => "run",
            Command::RunFile(_) => "run-file",
            Command::Cluster => "cluster",
            Command::Upload => "upload",
            Command::Version => "version",
        }
    }
}

/// 程序引导
pub struct AppBootstrap {
    config: Config,
    http_client: HttpClient,
    store: Arc<ResultStore>,
    _log_guard: Option<WorkerGuard>,
}

impl AppBootstrap {
    pub async fn new() -> Result<Self> {
        let loaded = ConfigManager::load()?;
        let log_guard = ConfigManager::initialize_logging(&loaded.config)?;

        info!(event = "app.start", build = %build_info::summary());
        loaded.log_summary();
        let config = loaded.config;

        let http_client = HttpClient::new(
            HttpClientConfig {
                timeout_secs: config.llm.timeout_secs,
                pool_max_idle_per_host: config.insight.max_concurrency,
                ..HttpClientConfig::default()
            }
            .with_env_proxy(),
        )?;

        let mut store = ResultStore::new(CsvSnapshot::new(&config.paths.results_csv));
        if config.mixpanel.enabled {
            store = store.with_sink(Arc::new(MixpanelUploader::new(&config.mixpanel, &http_client)?));
            info!(event = "app.sink_registered", sink = "mixpanel");
        }

        Ok(Self {
            config,
            http_client,
            store: Arc::new(store),
            _log_guard: log_guard,
        })
    }

    /// 组装数据源、模型和驱动器
    async fn build_insights(&self) -> Result<Arc<UserInsights>> {
        let config = &self.config;
        let max_connections = config.insight.max_concurrency.min(MAX_RECORD_CONNECTIONS) as u32;
        let records = SqliteRecordSource::connect(
            &config.records.database_url,
            &config.records.task_type,
            max_connections,
        )
        .await?;

        let mut inputs = Inputs::new(Arc::new(records))
            .with_analytics_users(load_analytics_users(&config.paths.analytics_users_csv)?);
        if config.pinecone.enabled {
            inputs = inputs.with_summaries(Arc::new(PineconeSummarySource::new(
                &config.pinecone,
                &self.http_client,
            )?));
        } else {
            info!(event = "app.summary_disabled");
        }

        let model = OpenAiModel::new(&config.llm, &self.http_client)?;
        info!(
            event = "app.insights_ready",
            model = %config.llm.model,
            analytics_users = inputs.analytics_user_count(),
            max_concurrency = config.insight.max_concurrency
        );

        Ok(Arc::new(UserInsights::new(
            Arc::new(inputs),
            Arc::clone(&self.store),
            Arc::new(model),
            InsightOptions::from(&config.insight),
        )))
    }

    /// 执行命令；收到退出信号时保存后返回
    pub async fn execute(self, command: Command) -> Result<()> {
        // 归类和上传只处理已有结果，总是从快照恢复
        let should_load = match command {
            Command::Cluster | Command::Upload => true,
            _ => self.config.insight.is_continue,
        };
        if should_load {
            self.store.load().await.context("加载结果快照失败")?;
        } else {
            info!(event = "app.fresh_start", reason = "is_continue=false");
        }

        let store = Arc::clone(&self.store);
        let name = command.name();
        tokio::select! {
            result = self.dispatch(command) => {
                if let Err(e) = &result {
                    error!(event = "app.command_failed", command = name, error = %e);
                }
                result
            }
            signal = shutdown_signal() => {
                warn!(event = "app.signal", signal = signal, "收到退出信号，保存结果后退出");
                match store.save().await {
                    Ok(count) => info!(event = "app.signal_saved", count),
                    Err(e) => error!(event = "app.signal_save_failed", error = %e),
                }
                Ok(())
            }
        }
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::RunAll => {
                let insights = self.build_insights().await?;
                let path = PathBuf::from(&self.config.paths.process_users_csv);
                insights.run_all(&path).await?;
            }
            Command::Run(user_ids) => {
                let insights = self.build_insights().await?;
                insights.run_batch(user_ids).await;
            }
            Command::RunFile(path) => {
                let insights = self.build_insights().await?;
                insights.run_all(&path).await?;
            }
            Command::Cluster => {
                let insights = self.build_insights().await?;
                insights.cluster().await;
            }
            Command::Upload => {
                if !self.config.mixpanel.enabled {
                    bail!("画像上传未启用，请配置 mixpanel.token 或 MIXPANEL_TOKEN");
                }
                let count = self.store.upload().await;
                info!(event = "app.uploaded", count);
            }
            Command::Version => println!("{}", build_info::summary()),
        }
        Ok(())
    }
}

/// 启动入口
pub async fn start(command: Command) -> Result<()> {
    if command == Command::Version {
        println!("{}", build_info::summary());
        return Ok(());
    }
    let app = AppBootstrap::new().await?;
    app.execute(command).await
}

/// 等待退出信号，返回信号名
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).ok();
        let mut quit = signal(SignalKind::quit()).ok();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = recv_or_pending(&mut term) => "SIGTERM",
            _ = recv_or_pending(&mut quit) => "SIGQUIT",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

#[cfg(unix)]
async fn recv_or_pending(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
