use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::broker::Broker;

/// Общая ячейка значения с ожиданием изменений.
#[derive(Default)]
pub struct SyncCell<T> {
    value: Mutex<T>,
    changed: Condvar,
}

/// Именованное общее значение: один поток выставляет, другие ждут нужного.
///
/// Все `SyncValue` с одним именем и типом в пределах брокера указывают на
/// одну ячейку.
pub struct SyncValue<T> {
    name: Arc<str>,
    cell: Arc<SyncCell<T>>,
}

impl<T> SyncValue<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Привязывается к ячейке `name`, создавая её со значением по умолчанию.
    pub fn bind(
        broker: &Broker,
        name: &str,
    ) -> Self {
        let cell = broker
            .objects()
            .find_or_create(name, SyncCell::<T>::default);
        Self {
            name: Arc::from(name),
            cell,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(
        &self,
        value: T,
    ) {
        *self.cell.value.lock() = value;
        self.cell.changed.notify_all();
    }

    pub fn get(&self) -> T {
        self.cell.value.lock().clone()
    }

    /// Ждёт, пока значение не станет равным `expected`.
    pub fn wait(
        &self,
        expected: &T,
    ) {
        let mut value = self.cell.value.lock();
        while *value != *expected {
            self.cell.changed.wait(&mut value);
        }
    }

    /// Как `wait`, но не дольше `timeout`. `true`, если дождались.
    pub fn wait_for(
        &self,
        expected: &T,
        timeout: Duration,
    ) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(expected, deadline),
            None => {
                self.wait(expected);
                true
            }
        }
    }

    pub fn wait_until(
        &self,
        expected: &T,
        deadline: Instant,
    ) -> bool {
        let mut value = self.cell.value.lock();
        while *value != *expected {
            if self
                .cell
                .changed
                .wait_until(&mut value, deadline)
                .timed_out()
            {
                return *value == *expected;
            }
        }
        true
    }
}

impl<T> Clone for SyncValue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SyncValue<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SyncValue")
            .field("name", &self.name)
            .field("value", &*self.cell.value.lock())
            .finish()
    }
}
