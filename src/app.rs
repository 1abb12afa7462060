use crate::downloader::{DownloadError, Downloader};
use crate::executor::Executor;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::settings::AppConfig;
use crate::tray::{MenuClicks, TrayError, TrayManager, TraySink};
use crate::types::{AppState, TrayCommand};

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};
use thiserror::Error;
use tokio::runtime::Runtime;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Tray(#[from] TrayError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// One download followed by one command run.
pub struct FetchCycle {
    url: String,
    downloader: Downloader,
    executor: Executor,
}

impl FetchCycle {
    pub fn new(config: &AppConfig, root: PathBuf) -> Self {
        Self {
            url: config.url.clone(),
            downloader: Downloader::new(config.filename_pattern.clone(), root),
            executor: Executor::new(config.command.clone(), config.args_template.clone()),
        }
    }

    /// Runs the cycle; command failures are logged, download failures are returned.
    pub fn try_run(&self) -> Result<PathBuf, DownloadError> {
        tracing::info!("Fetching {}", self.url);
        let path = self.downloader.download(&self.url)?;
        if let Err(e) = self.executor.execute(&path) {
            tracing::error!("{}", e);
        }
        Ok(path)
    }

    /// Like `try_run`, but exits the process on filesystem failures.
    pub fn run(&self) {
        match self.try_run() {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                tracing::error!("Fatal: {}", e);
                std::process::exit(1);
            }
            Err(e) => tracing::error!("{}", e),
        }
    }
}

pub struct App {
    config: Arc<AppConfig>,
    cycle: Arc<FetchCycle>,
    runtime: Option<Runtime>,
    scheduler: Scheduler,
    proxy: EventLoopProxy<TrayCommand>,
    state: AppState,
}

impl App {
    /// Builds the event loop on the calling thread, which must be the main thread.
    pub fn new(
        config: AppConfig,
        root: PathBuf,
    ) -> Result<(Self, EventLoop<TrayCommand>), AppError> {
        let config = Arc::new(config);
        let runtime = Runtime::new()?;
        let event_loop = EventLoopBuilder::<TrayCommand>::with_user_event().build();
        let proxy = event_loop.create_proxy();
        let scheduler = Scheduler::new(runtime.handle().clone(), Arc::new(proxy.clone()));

        let app = Self {
            cycle: Arc::new(FetchCycle::new(&config, root)),
            config,
            runtime: Some(runtime),
            scheduler,
            proxy,
            state: AppState::Initializing,
        };
        Ok((app, event_loop))
    }

    /// Runs the tray until "Quit" is chosen, then exits the process.
    pub fn run(mut self, event_loop: EventLoop<TrayCommand>) -> ! {
        let mut tray: Option<TrayManager> = None;

        event_loop.run(move |event, _, control_flow| {
            *control_flow = ControlFlow::Wait;

            match event {
                Event::NewEvents(StartCause::Init) => match self.on_ready() {
                    Ok(manager) => tray = Some(manager),
                    Err(e) => {
                        tracing::error!("Startup failed: {}", e);
                        self.on_exit();
                        *control_flow = ControlFlow::ExitWithCode(1);
                    }
                },
                Event::UserEvent(TrayCommand::SetTooltip(text)) => {
                    if let Some(manager) = &tray {
                        manager.set_tooltip(&text);
                    }
                }
                Event::UserEvent(TrayCommand::Quit) => {
                    self.on_exit();
                    tray.take();
                    self.advance(AppState::Terminated);
                    *control_flow = ControlFlow::Exit;
                }
                _ => {}
            }
        })
    }

    fn on_ready(&mut self) -> Result<TrayManager, AppError> {
        let (tray, clicks) = TrayManager::new()?;
        self.advance(AppState::Ready);

        let cycle = self.cycle.clone();
        let expression = &self.config.cron_expression;
        if self.scheduler.register(expression, Arc::new(move || cycle.run()))? {
            tracing::info!("Fetching on schedule '{}'", expression);
        }
        self.scheduler.start();

        self.spawn_listeners(clicks);
        Ok(tray)
    }

    fn spawn_listeners(&self, clicks: MenuClicks) {
        let MenuClicks { next, quit } = clicks;

        let cycle = self.cycle.clone();
        thread::spawn(move || {
            for () in next.iter() {
                cycle.run();
            }
        });

        let proxy = self.proxy.clone();
        thread::spawn(move || {
            for () in quit.iter() {
                if !proxy.post(TrayCommand::Quit) {
                    break;
                }
            }
        });
    }

    /// Stops the scheduler; in-flight fetches are not awaited.
    fn on_exit(&mut self) {
        self.advance(AppState::Exiting);
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        if let Err(e) = runtime.block_on(self.scheduler.shutdown()) {
            tracing::error!("{}", e);
        }
        runtime.shutdown_background();
    }

    fn advance(&mut self, next: AppState) {
        if self.state.can_advance_to(next) {
            tracing::info!("{} -> {}", self.state, next);
            self.state = next;
        } else {
            tracing::warn!("Ignoring transition {} -> {}", self.state, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_for(url: String) -> AppConfig {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let body = serde_json::json!({
            "url": url,
            "cron": "",
            "cmd": "echo",
            "args": "%s",
        });
        fs::write(&path, body.to_string()).unwrap();
        AppConfig::load_from(&path).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_fetch_cycle_downloads_into_todays_folder() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/img.png")
            .with_body("image-bytes")
            .create();

        let root = TempDir::new().unwrap();
        let config = config_for(format!("{}/img.png", server.url()));
        let cycle = FetchCycle::new(&config, root.path().to_path_buf());

        let path = cycle.try_run().unwrap();
        mock.assert();

        let today = Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(path.parent().unwrap(), root.path().join("download").join(today));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.chars().all(|c| c.is_ascii_digit()), "got {}", name);
        assert_eq!(fs::read_to_string(&path).unwrap(), "image-bytes");
    }

    #[test]
    fn test_fetch_cycle_surfaces_request_errors() {
        let root = TempDir::new().unwrap();
        let config = config_for("http://127.0.0.1:1/img.png".to_string());
        let cycle = FetchCycle::new(&config, root.path().to_path_buf());

        let err = cycle.try_run().unwrap_err();
        assert!(!err.is_fatal());
        assert!(!root.path().join("download").exists());
    }

    #[test]
    fn test_fetch_cycle_keeps_file_when_command_fails() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/img.png").with_body("x").create();

        let root = TempDir::new().unwrap();
        let mut config = config_for(format!("{}/img.png", server.url()));
        config.command = "wpaper-no-such-program".to_string();
        let cycle = FetchCycle::new(&config, root.path().to_path_buf());

        let path = cycle.try_run().unwrap();
        assert!(Path::new(&path).exists());
    }
}
