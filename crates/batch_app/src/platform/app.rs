use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{Context, Result};
use batch_core::{update, AppState, Msg, SessionState};
use batch_engine::{
    select_rows, write_report, BatchReport, EngineEvent, EngineHandle, HttpRequestExecutor,
    LogFacadeSink, ReqwestTransport,
};
use engine_logging::{engine_info, engine_warn, LogDestination, DEFAULT_LOG_FILE};

use super::effects::{to_msg, EffectRunner};
use super::render;
use super::rows::load_table;
use super::settings::{build_config, load_settings, EnvOverrides};
use crate::cli::{Args, LogTarget};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run_app(args: Args) -> Result<()> {
    dotenvy::dotenv().ok();
    engine_logging::initialize(log_destination(args.log), args.log_level());

    let settings = load_settings(args.settings.as_deref())?;
    let env = EnvOverrides::from_env()?;
    let config = build_config(&settings, &env, &args)?;

    let table = load_table(&args.rows)?;
    let rows = select_rows(&table, &config.schema);
    engine_info!(
        "Loaded {} rows from {:?}; {} selected for processing",
        table.len(),
        args.rows,
        rows.len()
    );

    let executor = HttpRequestExecutor::new(&config, &args.endpoint)?;
    engine_info!("Endpoint: {}", executor.url());
    let transport = ReqwestTransport::new(config.connect_timeout, config.get_timeout)?;
    let report_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| config.downloads_root.clone());
    let module_name = config.module_name.clone();

    let engine = EngineHandle::new(config, Arc::new(LogFacadeSink), Arc::new(transport))?;
    let selected = rows.len();
    let mut app = App {
        state: AppState::new(),
        runner: EffectRunner::new(engine, rows, Arc::new(executor)),
        quiet: args.quiet,
    };

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = msg_tx.send(Msg::CancelClicked);
    }) {
        engine_warn!("Ctrl-C handler not installed: {}", err);
    }

    app.dispatch(Msg::RowsLoaded {
        total: table.len(),
        selected,
    });
    app.dispatch(Msg::StartClicked);
    if app.state.session() != SessionState::Running {
        let notice = app.state.view().notice.unwrap_or_default();
        println!("{notice}");
        return Ok(());
    }

    let report = app.run_until_finished(&msg_rx)?;

    println!("{}", render::results_table(&app.state.view()));
    engine_info!("Batch summary: {}", report.summary());
    let path = write_report(&report_dir, &module_name, &report)
        .context("failed to write results report")?;
    println!("Results report: {}", path.display());
    Ok(())
}

struct App {
    state: AppState,
    runner: EffectRunner,
    quiet: bool,
}

impl App {
    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        let was_dirty = state.consume_dirty();
        let view = state.view();
        self.state = state;

        self.runner.enqueue(effects);
        if was_dirty && !self.quiet {
            println!("{}", render::status_line(&view));
        }
    }

    /// Pumps Ctrl-C requests and engine events into the core until the
    /// engine reports the batch finished.
    fn run_until_finished(&mut self, msg_rx: &mpsc::Receiver<Msg>) -> Result<BatchReport> {
        loop {
            while let Ok(msg) = msg_rx.try_recv() {
                self.dispatch(msg);
            }
            let Some(event) = self.runner.next_event(POLL_INTERVAL)? else {
                continue;
            };
            self.dispatch(to_msg(&event));
            if let EngineEvent::BatchFinished(report) = event {
                return Ok(report);
            }
        }
    }
}

fn log_destination(target: LogTarget) -> LogDestination {
    let file = PathBuf::from(DEFAULT_LOG_FILE);
    match target {
        LogTarget::File => LogDestination::File(file),
        LogTarget::Terminal => LogDestination::Terminal,
        LogTarget::Both => LogDestination::Both(file),
    }
}
