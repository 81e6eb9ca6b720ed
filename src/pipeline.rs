//! Producer/consumer read pipeline.
//!
//! The producer thread owns the sensor handle, reads it on a fixed interval and
//! pushes each outcome onto a bounded queue. The consumer thread drains the queue and
//! reports successful measurements. Both threads poll a shared [`QuitFlag`] once per
//! loop iteration and leave their loop when it is set.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use embedded_hal::delay::DelayNs;

use crate::dht22::Dht22;
use crate::error::DhtError;
use crate::frame::Measurement;
use crate::protocol::DataLine;

/// Queue slots between producer and consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Time between read attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(15_000);

/// Wait after creating the handle before the first read.
pub const DEFAULT_WARM_UP: Duration = Duration::from_millis(2_000);

/// How long the producer waits for queue space before dropping an entry.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(1_000);

/// One read outcome as passed through the queue.
pub type QueueEntry<E> = Result<Measurement, DhtError<E>>;

/// Pipeline timing and sizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Sleep between producer attempts; also the consumer's receive timeout.
    pub interval: Duration,
    pub warm_up: Duration,
    pub send_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            warm_up: DEFAULT_WARM_UP,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// One-shot stop signal shared by the pipeline threads.
///
/// Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Producer loop.
///
/// `init` receives the current pipeline time in milliseconds and creates the sensor
/// handle. If it fails, `quit` is set and the function returns without reading.
pub fn run_producer<PIN, DELAY, E, F>(
    init: F,
    tx: Sender<QueueEntry<E>>,
    quit: &QuitFlag,
    config: &PipelineConfig,
) where
    PIN: DataLine<Error = E>,
    DELAY: DelayNs,
    E: fmt::Debug,
    F: FnOnce(u64) -> Result<Dht22<PIN, DELAY>, DhtError<E>>,
{
    let epoch = Instant::now();
    let now_ms = || epoch.elapsed().as_millis() as u64;

    let mut sensor = match init(now_ms()) {
        Ok(sensor) => sensor,
        Err(e) => {
            log::error!("failed to initialize DHT22 sensor, exiting: {e}");
            quit.set();
            return;
        }
    };

    // A full read interval must pass before the first read.
    thread::sleep(config.warm_up);

    while !quit.is_set() {
        let entry = sensor.read(now_ms());
        match tx.send_timeout(entry, config.send_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                log::error!("producer: failed to add entry to queue");
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log::error!("producer: consumer is gone, exiting");
                quit.set();
                break;
            }
        }

        thread::sleep(config.interval);
    }

    log::info!(
        "producer: quit signal set, exiting loop (stats: {:?})",
        sensor.stats()
    );
}

/// Consumer loop.
///
/// Calls `report` for every successful measurement in queue order.
pub fn run_consumer<E, R>(
    rx: Receiver<QueueEntry<E>>,
    quit: &QuitFlag,
    config: &PipelineConfig,
    mut report: R,
) where
    E: fmt::Debug,
    R: FnMut(&Measurement),
{
    while !quit.is_set() {
        match rx.recv_timeout(config.interval) {
            Ok(Ok(measurement)) => report(&measurement),
            Ok(Err(e)) => log::warn!("consumer: skipping failed read: {e}"),
            Err(RecvTimeoutError::Timeout) => {
                log::error!("consumer: failed to read from queue");
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("consumer: producer is gone");
                quit.set();
            }
        }
    }

    log::info!("consumer: quit signal set, exiting loop");
}

/// Default reporter: logs the measurement at info level.
pub fn log_measurement(measurement: &Measurement) {
    log::info!("Temperature {measurement}");
}

/// Running producer and consumer threads.
pub struct Pipeline {
    quit: QuitFlag,
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl Pipeline {
    /// Starts both threads.
    ///
    /// The sensor handle is created by `init` on the producer thread, so the pin and
    /// delay types need not be `Send`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a thread cannot be spawned. If the consumer fails to
    /// start, the producer is stopped before returning.
    pub fn spawn<PIN, DELAY, E, F, R>(config: PipelineConfig, init: F, report: R) -> io::Result<Self>
    where
        PIN: DataLine<Error = E> + 'static,
        DELAY: DelayNs + 'static,
        E: fmt::Debug + Send + 'static,
        F: FnOnce(u64) -> Result<Dht22<PIN, DELAY>, DhtError<E>> + Send + 'static,
        R: FnMut(&Measurement) + Send + 'static,
    {
        let (tx, rx) = bounded(config.queue_capacity);
        let quit = QuitFlag::new();

        let producer = thread::Builder::new()
            .name("dht22-producer".into())
            .spawn({
                let quit = quit.clone();
                let config = config.clone();
                move || run_producer(init, tx, &quit, &config)
            })?;

        let consumer = thread::Builder::new()
            .name("dht22-consumer".into())
            .spawn({
                let quit = quit.clone();
                move || run_consumer(rx, &quit, &config, report)
            });

        let consumer = match consumer {
            Ok(consumer) => consumer,
            Err(e) => {
                log::error!("failed to start consumer thread: {e}");
                quit.set();
                let _ = producer.join();
                return Err(e);
            }
        };

        Ok(Self {
            quit,
            producer,
            consumer,
        })
    }

    pub fn quit_flag(&self) -> &QuitFlag {
        &self.quit
    }

    /// Sets the quit flag and waits for both threads to leave their loops.
    pub fn stop(self) -> thread::Result<()> {
        self.quit.set();
        self.join()
    }

    /// Waits for both threads without signalling them.
    pub fn join(self) -> thread::Result<()> {
        self.producer.join()?;
        self.consumer.join()
    }
}
