use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use crate::broker::Broker;

/// Сигнал остановки, общий для всех рабочих потоков.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            *cancelled = true;
            self.inner.changed.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Спит `duration` или до отмены.
    ///
    /// Возвращает `true`, если проспал всё время, и `false`, если разбужен
    /// отменой.
    pub fn sleep(
        &self,
        duration: Duration,
    ) -> bool {
        !self.wait_for(duration)
    }

    /// Ждёт отмены не дольше `timeout`; `true`, если отмена произошла.
    pub fn wait_for(
        &self,
        timeout: Duration,
    ) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .changed
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }

    /// Ждёт отмены без ограничения по времени.
    pub fn wait(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            self.inner.changed.wait(&mut cancelled);
        }
    }
}

/// Итог остановки рабочих потоков.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Потоки, завершившиеся штатно
    pub joined: Vec<String>,
    /// Потоки, завершившиеся паникой
    pub panicked: Vec<String>,
    /// Потоки, не успевшие завершиться за отведённое время
    pub detached: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.panicked.is_empty() && self.detached.is_empty()
    }
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

/// Владелец рабочих потоков процесса.
///
/// Потоки запускаются с общим [`CancelToken`]; [`Lifecycle::shutdown`]
/// отменяет его, закрывает все каналы брокера (заблокированные `pop`
/// просыпаются) и дожидается потоков.
pub struct Lifecycle {
    broker: Arc<Broker>,
    token: CancelToken,
    workers: Mutex<Vec<Worker>>,
}

impl Lifecycle {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self {
            broker,
            token: CancelToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Запускает именованный поток.
    pub fn spawn<F>(
        &self,
        name: &str,
        f: F,
    ) -> io::Result<()>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let token = self.token.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || f(token))?;
        info!(worker = name, "worker started");
        self.workers.lock().push(Worker {
            name: name.to_string(),
            handle,
        });
        Ok(())
    }

    /// Число ещё работающих потоков.
    pub fn active(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|w| !w.handle.is_finished())
            .count()
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.lock().iter().map(|w| w.name.clone()).collect()
    }

    /// Останавливает все потоки и ждёт их не дольше `timeout`.
    pub fn shutdown(
        &self,
        timeout: Duration,
    ) -> ShutdownReport {
        info!("shutdown requested");
        self.token.cancel();
        self.broker.close_all();

        // Слишком большой таймаут означает ожидание без ограничения.
        let deadline = Instant::now().checked_add(timeout);
        let workers = std::mem::take(&mut *self.workers.lock());
        while deadline.map_or(true, |d| Instant::now() < d)
            && workers.iter().any(|w| !w.handle.is_finished())
        {
            thread::sleep(Duration::from_millis(5));
        }

        let mut report = ShutdownReport::default();
        for worker in workers {
            if !worker.handle.is_finished() {
                warn!(worker = %worker.name, "worker did not stop in time, detaching");
                report.detached.push(worker.name);
                continue;
            }
            match worker.handle.join() {
                Ok(()) => report.joined.push(worker.name),
                Err(_) => {
                    error!(worker = %worker.name, "worker panicked");
                    report.panicked.push(worker.name);
                }
            }
        }
        info!(
            joined = report.joined.len(),
            panicked = report.panicked.len(),
            detached = report.detached.len(),
            "shutdown complete"
        );
        report
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
