mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_engine::{
    DownloadManager, EngineConfig, JobScheduler, LogFacadeSink, OrderedLogAggregator,
};
use common::{row, transport_error, ScriptedExecutor, StaticTransport};
use log::{LevelFilter, Log, Metadata, Record};

struct CaptureLogger {
    records: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let text = record.args().to_string();
        // Some per-record I/O cost so workers get a chance to race.
        std::thread::sleep(Duration::from_micros(50));
        self.records.lock().unwrap().push(text);
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_row_block_is_one_facade_record() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let config = EngineConfig {
        max_workers: 8,
        ..EngineConfig::default()
    };
    let logs = OrderedLogAggregator::new(Arc::new(LogFacadeSink));
    let downloads = Arc::new(DownloadManager::new("downloads", StaticTransport::new(&[])));
    let scheduler = JobScheduler::new(config, logs, downloads).unwrap();

    let mut executor = ScriptedExecutor::new().with_delay(Duration::from_millis(2));
    let rows: Vec<_> = (0..40)
        .map(|i| row(i, &[("cuit", &format!("R{i}")), ("retry", "3")]))
        .collect();
    for i in 0..40 {
        executor = executor.script(
            &format!("R{i}"),
            vec![transport_error(), transport_error(), transport_error()],
        );
    }

    scheduler.run(rows, Arc::new(executor)).await;

    let records = LOGGER.records.lock().unwrap().clone();
    let blocks: Vec<_> = records.iter().filter(|r| r.contains("ROW: ")).collect();
    assert_eq!(blocks.len(), 40);
    for block in &blocks {
        assert_eq!(block.matches("REQUEST (").count(), 3, "{block}");
        assert!(!block.contains("attempt 1/3 failed"), "{block}");
    }
    // Request lines only ever appear inside a block record.
    assert!(records
        .iter()
        .filter(|r| r.contains("REQUEST ("))
        .all(|r| r.contains("ROW: ")));
    assert!(records.iter().any(|r| r.contains("[R0] attempt 1/3 failed")));
}
