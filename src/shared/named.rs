use std::{
    any::{Any, TypeId},
    sync::{Arc, Weak},
};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::trace;

type ObjectKey = (TypeId, Arc<str>);

/// Таблица именованных общих объектов, своя для каждого Rust-типа.
///
/// Хранит слабые ссылки: объект исчезает из таблицы, когда отпускается
/// последний `Arc`. Одно и то же имя может использоваться разными типами
/// независимо.
#[derive(Default)]
pub struct NamedObjects {
    objects: DashMap<ObjectKey, Weak<dyn Any + Send + Sync>>,
}

impl NamedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создаёт объект под именем `name`.
    ///
    /// Возвращает `None`, если живой объект с таким именем уже есть.
    pub fn create<T: Send + Sync + 'static>(
        &self,
        name: &str,
        value: T,
    ) -> Option<Arc<T>> {
        match self.objects.entry(key::<T>(name)) {
            Entry::Occupied(mut entry) => {
                if entry.get().strong_count() > 0 {
                    return None;
                }
                let obj = Arc::new(value);
                entry.insert(downgrade(&obj));
                Some(obj)
            }
            Entry::Vacant(entry) => {
                let obj = Arc::new(value);
                entry.insert(downgrade(&obj));
                trace!(name, "shared object created");
                Some(obj)
            }
        }
    }

    pub fn find<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Option<Arc<T>> {
        self.objects
            .get(&key::<T>(name))
            .and_then(|weak| weak.upgrade())
            .and_then(|obj| obj.downcast::<T>().ok())
    }

    /// Находит объект или создаёт его через `init` атомарно.
    pub fn find_or_create<T, F>(
        &self,
        name: &str,
        init: F,
    ) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut entry = self
            .objects
            .entry(key::<T>(name))
            .or_insert_with(|| Weak::<T>::new() as Weak<dyn Any + Send + Sync>);
        if let Some(obj) = entry.upgrade().and_then(|o| o.downcast::<T>().ok()) {
            return obj;
        }
        let obj = Arc::new(init());
        *entry = downgrade(&obj);
        obj
    }

    /// Имена живых объектов типа `T`, отсортированные.
    pub fn names<T: Send + Sync + 'static>(&self) -> Vec<String> {
        let type_id = TypeId::of::<T>();
        self.objects
            .retain(|_, weak| weak.strong_count() > 0);
        let mut names: Vec<String> = self
            .objects
            .iter()
            .filter(|e| e.key().0 == type_id)
            .map(|e| e.key().1.to_string())
            .collect();
        names.sort();
        names
    }
}

fn key<T: 'static>(name: &str) -> ObjectKey {
    (TypeId::of::<T>(), Arc::from(name))
}

fn downgrade<T: Send + Sync + 'static>(obj: &Arc<T>) -> Weak<dyn Any + Send + Sync> {
    let weak: Weak<T> = Arc::downgrade(obj);
    weak
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;

    #[test]
    fn test_create_find() {
        let objects = NamedObjects::new();
        let a = objects.create("counter", 5u32).unwrap();
        assert!(objects.create("counter", 6u32).is_none());
        assert_eq!(*objects.find::<u32>("counter").unwrap(), 5);
        assert!(Arc::ptr_eq(&a, &objects.find::<u32>("counter").unwrap()));
    }

    #[test]
    fn test_types_have_separate_namespaces() {
        let objects = NamedObjects::new();
        let _a = objects.create("x", 1u32).unwrap();
        let _b = objects.create("x", String::from("one")).unwrap();
        assert!(objects.find::<u64>("x").is_none());
        assert_eq!(objects.names::<u32>(), vec!["x"]);
    }

    #[test]
    fn test_dropped_objects_disappear() {
        let objects = NamedObjects::new();
        let a = objects.create("tmp", 1i32).unwrap();
        drop(a);
        assert!(objects.find::<i32>("tmp").is_none());
        assert!(objects.names::<i32>().is_empty());
        assert!(objects.create("tmp", 2i32).is_some());
    }

    #[test]
    fn test_find_or_create_concurrent() {
        let objects = Arc::new(NamedObjects::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let objects = objects.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    objects.find_or_create("shared", || i)
                })
            })
            .collect();
        let all: Vec<Arc<i32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for obj in &all[1..] {
            assert!(Arc::ptr_eq(&all[0], obj));
        }
    }
}
