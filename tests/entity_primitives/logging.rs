use entkit::{Database, Diagnostic, DiagnosticSink, Key, RetryConfig, TracingSink, Value};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct BufMakeWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for BufMakeWriter {
    type Writer = BufWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufWriter(Arc::clone(&self.0))
    }
}

struct BufWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for BufWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_tracing_capture<F, R>(f: F) -> (R, String)
where
    F: FnOnce() -> R,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(BufMakeWriter(Arc::clone(&buf)))
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let bytes = buf.lock().clone();
    (result, String::from_utf8_lossy(&bytes).to_string())
}

#[test]
fn test_tracing_sink_logs_refresh_failure_as_warning() {
    let ((), logs) = with_tracing_capture(|| {
        TracingSink.report(Diagnostic::RelationRefreshFailed {
            key: Key::name("Team", "core"),
            reason: "index entry unreadable".to_string(),
        })
    });

    assert!(logs.contains("WARN"), "logs: {}", logs);
    assert!(logs.contains("entkit::relations"), "logs: {}", logs);
    assert!(logs.contains("index entry unreadable"), "logs: {}", logs);
}

#[test]
fn test_default_sink_logs_conflict_retry() {
    let db = Database::builder()
        .retry(RetryConfig::new().with_base_delay_ms(0).with_max_delay_ms(0))
        .open()
        .unwrap();
    let key = Key::name("K", "k");
    db.transaction(|txn| txn.put(key.clone(), Value::Int(0)))
        .unwrap();

    let interfered = AtomicBool::new(false);
    let (result, logs) = with_tracing_capture(|| {
        db.run_in_transaction(|txn| {
            txn.get(&key)?;
            if !interfered.swap(true, Ordering::SeqCst) {
                db.transaction(|other| other.put(key.clone(), Value::Int(1)))?;
            }
            txn.put(key.clone(), Value::Int(2))
        })
    });

    assert!(result.is_ok());
    assert!(logs.contains("retrying after conflict"), "logs: {}", logs);
}
