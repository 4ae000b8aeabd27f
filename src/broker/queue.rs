use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chanbus_error::{RecvError, TryRecvError};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::trace;

/// Что произошло с сообщением при `push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Сообщение добавлено в хвост
    Enqueued,
    /// Сообщение добавлено, самое старое вытеснено
    EvictedOldest,
    /// Очередь закрыта, сообщение отброшено
    Discarded,
}

/// Снимок счётчиков очереди.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub pushed: u64,
    pub popped: u64,
    pub evicted: u64,
    pub len: usize,
    /// `None`: очередь без ограничения
    pub capacity: Option<usize>,
    pub closed: bool,
}

struct QueueState<T> {
    items: VecDeque<T>,
    /// 0: без ограничения
    capacity: usize,
    /// Ёмкость задана явно (а не взята из настроек по умолчанию)
    declared: bool,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    popped: AtomicU64,
    evicted: AtomicU64,
}

/// FIFO-очередь канала с вытеснением самого старого сообщения при
/// переполнении.
///
/// `push` никогда не блокирует производителя. `pop` ждёт сообщение,
/// `pop_for`/`pop_until` ограничивают ожидание, `try_pop` не ждёт вовсе.
/// После [`Queue::close`] получатели вычитывают остаток и затем получают
/// `Closed`.
pub struct Queue<T> {
    name: Arc<str>,
    state: Mutex<QueueState<T>>,
    available: Condvar,
    counters: Counters,
}

impl<T> Queue<T> {
    /// Создаёт очередь. `None` и `Some(0)` означают отсутствие ограничения.
    pub fn new(
        name: impl Into<Arc<str>>,
        capacity: Option<usize>,
    ) -> Self {
        Self::with_default(name, capacity, 0)
    }

    /// Создаёт очередь, у которой без явной ёмкости используется
    /// `default_capacity`. Явное объявление позже может её заменить.
    pub(crate) fn with_default(
        name: impl Into<Arc<str>>,
        capacity: Option<usize>,
        default_capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                capacity: capacity.unwrap_or(default_capacity),
                declared: capacity.is_some(),
                closed: false,
            }),
            available: Condvar::new(),
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Добавляет сообщение в хвост.
    ///
    /// Если очередь ограничена и заполнена, голова вытесняется.
    pub fn push(
        &self,
        msg: T,
    ) -> PushOutcome {
        let mut state = self.state.lock();
        if state.closed {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Discarded;
        }

        let mut outcome = PushOutcome::Enqueued;
        if state.capacity > 0 && state.items.len() >= state.capacity {
            state.items.pop_front();
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            outcome = PushOutcome::EvictedOldest;
            trace!(channel = %self.name, "queue full, oldest message evicted");
        }
        state.items.push_back(msg);
        self.counters.pushed.fetch_add(1, Ordering::Relaxed);
        drop(state);

        self.available.notify_one();
        outcome
    }

    /// Ждёт сообщение без ограничения по времени.
    ///
    /// Возвращает ошибку только если очередь закрыта и пуста.
    pub fn pop(&self) -> Result<T, RecvError> {
        let mut state = self.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return Ok(self.delivered(msg));
            }
            if state.closed {
                return Err(self.closed());
            }
            self.available.wait(&mut state);
        }
    }

    /// Ждёт сообщение не дольше `timeout`. Нулевой таймаут: опрос без
    /// ожидания.
    pub fn pop_for(
        &self,
        timeout: Duration,
    ) -> Result<T, RecvError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline, timeout),
            None => self.pop(),
        }
    }

    /// Ждёт сообщение до момента `deadline`.
    pub fn pop_until(
        &self,
        deadline: Instant,
    ) -> Result<T, RecvError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.wait_until(deadline, timeout)
    }

    /// Забирает голову, если она есть.
    pub fn try_pop(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(msg) => Ok(self.delivered(msg)),
            None if state.closed => Err(TryRecvError::Closed {
                channel: self.name.to_string(),
            }),
            None => Err(TryRecvError::Empty),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Текущая ёмкость; `None`: без ограничения.
    pub fn capacity(&self) -> Option<usize> {
        let state = self.state.lock();
        (state.capacity > 0).then_some(state.capacity)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Закрывает очередь и будит всех ожидающих получателей.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn stats(&self) -> ChannelStats {
        let state = self.state.lock();
        ChannelStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            popped: self.counters.popped.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            len: state.items.len(),
            capacity: (state.capacity > 0).then_some(state.capacity),
            closed: state.closed,
        }
    }

    /// Явно объявляет ёмкость.
    ///
    /// Первое объявление фиксирует ёмкость (лишние старые сообщения
    /// вытесняются). Повторное с тем же значением проходит, с другим
    /// возвращает `Err` с уже объявленной ёмкостью.
    pub(crate) fn declare_capacity(
        &self,
        capacity: usize,
    ) -> Result<(), usize> {
        let mut state = self.state.lock();
        if state.declared {
            return if state.capacity == capacity {
                Ok(())
            } else {
                Err(state.capacity)
            };
        }
        state.declared = true;
        state.capacity = capacity;
        if capacity > 0 {
            while state.items.len() > capacity {
                state.items.pop_front();
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn wait_until(
        &self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<T, RecvError> {
        let mut state = self.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return Ok(self.delivered(msg));
            }
            if state.closed {
                return Err(self.closed());
            }
            if Instant::now() >= deadline {
                return Err(RecvError::Timeout {
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            // Ложные пробуждения и чужие `pop` возвращают в цикл.
            self.available.wait_until(&mut state, deadline);
        }
    }

    fn delivered(
        &self,
        msg: T,
    ) -> T {
        self.counters.popped.fetch_add(1, Ordering::Relaxed);
        msg
    }

    fn closed(&self) -> RecvError {
        RecvError::Closed {
            channel: self.name.to_string(),
        }
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("len", &stats.len)
            .field("capacity", &stats.capacity)
            .field("closed", &stats.closed)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_fifo_unbounded() {
        let q = Queue::new("q", None);
        for i in 0..100 {
            assert_eq!(q.push(i), PushOutcome::Enqueued);
        }
        for i in 0..100 {
            assert_eq!(q.try_pop().unwrap(), i);
        }
        assert_eq!(q.try_pop(), Err(TryRecvError::Empty));
    }

    /// Тест проверяет, что при переполнении остаются последние `C` сообщений.
    #[test]
    fn test_drop_oldest() {
        let q = Queue::new("q", Some(3));
        for i in 0..5 {
            q.push(i);
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.try_pop().unwrap(), 2);
        assert_eq!(q.try_pop().unwrap(), 3);
        assert_eq!(q.try_pop().unwrap(), 4);

        let stats = q.stats();
        assert_eq!(stats.pushed, 5);
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.popped, 3);
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let q = Queue::new("q", Some(0));
        for i in 0..1000 {
            q.push(i);
        }
        assert_eq!(q.len(), 1000);
        assert_eq!(q.capacity(), None);
    }

    #[test]
    fn test_pop_for_timeout_waits() {
        let q: Queue<i32> = Queue::new("q", None);
        let start = Instant::now();
        let err = q.pop_for(Duration::from_millis(50)).unwrap_err();
        let elapsed = start.elapsed();
        assert_eq!(err, RecvError::Timeout { waited_ms: 50 });
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[test]
    fn test_pop_for_zero_is_poll() {
        let q: Queue<i32> = Queue::new("q", None);
        let err = q.pop_for(Duration::ZERO).unwrap_err();
        assert_eq!(err, RecvError::Timeout { waited_ms: 0 });
        q.push(1);
        assert_eq!(q.pop_for(Duration::ZERO).unwrap(), 1);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let q = Arc::new(Queue::new("q", None));
        let q2 = q.clone();
        let consumer = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(consumer.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_close_wakes_and_drains() {
        let q = Arc::new(Queue::new("chan", None));
        q.push(1);

        let q2 = q.clone();
        assert_eq!(q2.pop().unwrap(), 1);
        let waiter = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(
            waiter.join().unwrap(),
            Err(RecvError::Closed {
                channel: "chan".to_string()
            })
        );

        assert_eq!(q.push(2), PushOutcome::Discarded);
        assert!(matches!(q.try_pop(), Err(TryRecvError::Closed { .. })));
    }

    #[test]
    fn test_closed_queue_drains_before_error() {
        let q = Queue::new("chan", None);
        q.push(1);
        q.push(2);
        q.close();
        assert_eq!(q.pop().unwrap(), 1);
        assert_eq!(q.pop_for(Duration::from_millis(10)).unwrap(), 2);
        assert!(q.pop().is_err());
    }

    #[test]
    fn test_declare_capacity_shrinks_once() {
        let q = Queue::with_default("q", None, 0);
        for i in 0..10 {
            q.push(i);
        }
        q.declare_capacity(4).unwrap();
        assert_eq!(q.len(), 4);
        assert_eq!(q.try_pop().unwrap(), 6);
        assert_eq!(q.declare_capacity(4), Ok(()));
        assert_eq!(q.declare_capacity(8), Err(4));
    }

    #[test]
    fn test_pop_until_past_deadline() {
        let q: Queue<u8> = Queue::new("q", None);
        let err = q.pop_until(Instant::now()).unwrap_err();
        assert!(matches!(err, RecvError::Timeout { .. }));
    }
}
