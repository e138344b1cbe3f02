//! Observable option lists for select-type widgets.
//!
//! An [`OptionsSource`] holds the current `(key, label)` list and a list of
//! subscribers. `subscribe` hands back the data known *right now* (possibly
//! empty while a fetch is pending) and every later change is pushed to each
//! subscriber in subscription order.
//!
//! Three variants exist:
//! - custom: data is whatever was last passed to [`OptionsSource::set_data`]
//! - hash-keyed: a `key -> options` table switched by [`OptionsSource::set_key`]
//! - fetch-backed: loaded once, lazily, on the first subscription
//!
//! Everything is single-threaded. Asynchronous loads run on an injected
//! [`LocalSpawn`]; the source is held weakly by the load task so a result
//! arriving after teardown is dropped silently.
//!
//! A failed load is neither retried nor swallowed: the shared outcome returned
//! by [`OptionsSource::fetch_outcome`] resolves to the [`FetchError`]. Call
//! [`OptionsSource::reload`] to try again.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use futures::task::LocalSpawn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::FetchError;
use crate::value::key_string;

/// One selectable entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    pub key: Value,
    pub label: String,
}

impl OptionItem {
    pub fn new(key: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    /// Self-paired entry: the raw value is its own label.
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            key: raw.clone(),
            label: key_string(raw),
        }
    }
}

/// Subscriber callback. Identity is the `Rc` allocation.
pub type Subscriber = Rc<dyn Fn(&[OptionItem])>;

/// Option table of a hash-keyed source.
pub type OptionTable = HashMap<String, Vec<OptionItem>>;

/// Shared, awaitable outcome of an asynchronous load.
pub type FetchOutcome<T> = Shared<LocalBoxFuture<'static, Result<T, FetchError>>>;

type Producer<T> = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<T, FetchError>>>;

/// How raw fetched records become option items.
#[derive(Clone)]
pub enum FieldExtractor {
    /// Read `key` and `label` fields of each record.
    Pair { key: String, label: String },
    /// Arbitrary mapping.
    Map(Rc<dyn Fn(&Value) -> OptionItem>),
}

impl FieldExtractor {
    pub fn pair(key: impl Into<String>, label: impl Into<String>) -> Self {
        FieldExtractor::Pair {
            key: key.into(),
            label: label.into(),
        }
    }

    pub fn map(f: impl Fn(&Value) -> OptionItem + 'static) -> Self {
        FieldExtractor::Map(Rc::new(f))
    }

    pub fn extract(&self, record: &Value) -> OptionItem {
        match self {
            FieldExtractor::Pair { key, label } => OptionItem {
                key: record.get(key).cloned().unwrap_or(Value::Null),
                label: record.get(label).map(key_string).unwrap_or_default(),
            },
            FieldExtractor::Map(f) => f(record),
        }
    }
}

impl fmt::Debug for FieldExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldExtractor::Pair { key, label } => write!(f, "Pair({key}, {label})"),
            FieldExtractor::Map(_) => write!(f, "Map(..)"),
        }
    }
}

/// Lazily started asynchronous load.
struct LazyLoad<T: Clone + 'static> {
    producer: Producer<T>,
    spawner: Rc<dyn LocalSpawn>,
    outcome: Option<FetchOutcome<T>>,
}

impl<T: Clone + 'static> LazyLoad<T> {
    fn new(producer: Producer<T>, spawner: Rc<dyn LocalSpawn>) -> Self {
        Self {
            producer,
            spawner,
            outcome: None,
        }
    }
}

enum Variant {
    Custom,
    Hashed {
        table: OptionTable,
        key: String,
        loader: Option<LazyLoad<OptionTable>>,
    },
    Fetched(LazyLoad<Vec<OptionItem>>),
}

struct Inner {
    subscribers: RefCell<Vec<Subscriber>>,
    data: RefCell<Vec<OptionItem>>,
    variant: RefCell<Variant>,
}

/// Cheap-clone handle to an observable option list.
#[derive(Clone)]
pub struct OptionsSource {
    inner: Rc<Inner>,
}

impl fmt::Debug for OptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match &*self.inner.variant.borrow() {
            Variant::Custom => "custom",
            Variant::Hashed { .. } => "hashed",
            Variant::Fetched(_) => "fetched",
        };
        f.debug_struct("OptionsSource")
            .field("variant", &variant)
            .field("items", &self.inner.data.borrow().len())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

impl OptionsSource {
    fn with_variant(variant: Variant, data: Vec<OptionItem>) -> Self {
        Self {
            inner: Rc::new(Inner {
                subscribers: RefCell::new(Vec::new()),
                data: RefCell::new(data),
                variant: RefCell::new(variant),
            }),
        }
    }

    /// Source whose data is set explicitly.
    pub fn custom(data: Vec<OptionItem>) -> Self {
        Self::with_variant(Variant::Custom, data)
    }

    /// Source switching between the lists of `table` by key.
    pub fn hashed(table: OptionTable, initial_key: impl Into<String>) -> Self {
        let key = initial_key.into();
        let data = table.get(&key).cloned().unwrap_or_default();
        Self::with_variant(
            Variant::Hashed {
                table,
                key,
                loader: None,
            },
            data,
        )
    }

    /// Hash-keyed source whose table is produced asynchronously on first
    /// subscription.
    pub fn hashed_async<F>(
        load: F,
        initial_key: impl Into<String>,
        spawner: Rc<dyn LocalSpawn>,
    ) -> Self
    where
        F: Fn() -> LocalBoxFuture<'static, Result<OptionTable, FetchError>> + 'static,
    {
        Self::with_variant(
            Variant::Hashed {
                table: OptionTable::new(),
                key: initial_key.into(),
                loader: Some(LazyLoad::new(Rc::new(load), spawner)),
            },
            Vec::new(),
        )
    }

    /// Source filled once from `fetch`, mapping each record with `extractor`.
    pub fn fetched<F>(fetch: F, extractor: FieldExtractor, spawner: Rc<dyn LocalSpawn>) -> Self
    where
        F: Fn() -> LocalBoxFuture<'static, Result<Vec<Value>, FetchError>> + 'static,
    {
        let producer: Producer<Vec<OptionItem>> = Rc::new(move || {
            let records = fetch();
            let extractor = extractor.clone();
            async move {
                let records = records.await?;
                Ok::<_, FetchError>(records.iter().map(|r| extractor.extract(r)).collect::<Vec<_>>())
            }
            .boxed_local()
        });
        Self::with_variant(
            Variant::Fetched(LazyLoad::new(producer, spawner)),
            Vec::new(),
        )
    }

    pub fn ptr_eq(&self, other: &OptionsSource) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current data without subscribing.
    pub fn data(&self) -> Vec<OptionItem> {
        self.inner.data.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Register `subscriber` and return the data known now. A subscriber that
    /// is already registered is not added twice.
    pub fn subscribe(&self, subscriber: Subscriber) -> Vec<OptionItem> {
        {
            let mut subs = self.inner.subscribers.borrow_mut();
            if !subs.iter().any(|s| Rc::ptr_eq(s, &subscriber)) {
                subs.push(subscriber);
            }
        }
        self.ensure_loading();
        self.data()
    }

    /// Remove `subscriber`. Unknown subscribers are ignored.
    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        self.inner
            .subscribers
            .borrow_mut()
            .retain(|s| !Rc::ptr_eq(s, subscriber));
    }

    /// Replace the data of a custom source and notify. On other variants the
    /// data is replaced until the next key switch or load.
    pub fn set_data(&self, data: Vec<OptionItem>) {
        self.notify(data);
    }

    /// Switch the active list of a hash-keyed source and notify. Unknown keys
    /// select an empty list.
    pub fn set_key(&self, key: &str) {
        let data = {
            let mut variant = self.inner.variant.borrow_mut();
            let Variant::Hashed {
                table, key: current, ..
            } = &mut *variant
            else {
                warn!(key, "set_key on an options source that is not hash-keyed");
                return;
            };
            *current = key.to_string();
            table.get(key).cloned().unwrap_or_default()
        };
        debug!(key, items = data.len(), "options key switched");
        self.notify(data);
    }

    /// Active key of a hash-keyed source.
    pub fn key(&self) -> Option<String> {
        match &*self.inner.variant.borrow() {
            Variant::Hashed { key, .. } => Some(key.clone()),
            _ => None,
        }
    }

    /// Store `data` and push it to every subscriber in subscription order.
    fn notify(&self, data: Vec<OptionItem>) {
        *self.inner.data.borrow_mut() = data;
        // Callbacks may (un)subscribe, so iterate over a snapshot.
        let subscribers = self.inner.subscribers.borrow().clone();
        if subscribers.is_empty() {
            return;
        }
        let data = self.data();
        for subscriber in subscribers {
            subscriber(&data);
        }
    }

    /// Awaitable outcome of the current load, once one was started.
    pub fn fetch_outcome(&self) -> Option<FetchOutcome<Vec<OptionItem>>> {
        match &*self.inner.variant.borrow() {
            Variant::Fetched(load) => load.outcome.clone(),
            Variant::Hashed {
                loader: Some(load), ..
            } => load.outcome.clone().map(|outcome| {
                async move {
                    outcome
                        .await
                        .map(|table| table.into_values().flatten().collect::<Vec<OptionItem>>())
                }
                    .boxed_local()
                    .shared()
            }),
            _ => None,
        }
    }

    /// Forget the previous load outcome and load again if anyone listens.
    pub fn reload(&self) {
        match &mut *self.inner.variant.borrow_mut() {
            Variant::Fetched(load) => load.outcome = None,
            Variant::Hashed {
                loader: Some(load), ..
            } => load.outcome = None,
            _ => return,
        }
        if self.subscriber_count() > 0 {
            self.ensure_loading();
        }
    }

    fn ensure_loading(&self) {
        start(&self.inner, hashed_load, |inner, table| {
            let data = {
                let mut variant = inner.variant.borrow_mut();
                let Variant::Hashed {
                    table: current,
                    key,
                    ..
                } = &mut *variant
                else {
                    return;
                };
                *current = table;
                current.get(key.as_str()).cloned().unwrap_or_default()
            };
            OptionsSource { inner }.notify(data);
        });
        start(&self.inner, fetched_load, |inner, items| {
            OptionsSource { inner }.notify(items);
        });
    }
}

fn hashed_load(variant: &mut Variant) -> Option<&mut LazyLoad<OptionTable>> {
    match variant {
        Variant::Hashed {
            loader: Some(load), ..
        } => Some(load),
        _ => None,
    }
}

fn fetched_load(variant: &mut Variant) -> Option<&mut LazyLoad<Vec<OptionItem>>> {
    match variant {
        Variant::Fetched(load) => Some(load),
        _ => None,
    }
}

/// Spawn the load found through `slot` unless it already ran. `apply` runs
/// with the source if it is still alive when the load succeeds.
///
/// No borrow of the variant is held while the producer or the spawner run,
/// both may call back into the source.
fn start<T, A>(inner: &Rc<Inner>, slot: fn(&mut Variant) -> Option<&mut LazyLoad<T>>, apply: A)
where
    T: Clone + 'static,
    A: FnOnce(Rc<Inner>, T) + 'static,
{
    let (producer, spawner) = {
        let mut variant = inner.variant.borrow_mut();
        match slot(&mut *variant) {
            Some(load) if load.outcome.is_none() => (load.producer.clone(), load.spawner.clone()),
            _ => return,
        }
    };

    let outcome = producer().shared();
    {
        let mut variant = inner.variant.borrow_mut();
        let Some(load) = slot(&mut *variant) else {
            return;
        };
        if load.outcome.is_some() {
            // started by a nested call from the producer
            return;
        }
        load.outcome = Some(outcome.clone());
    }
    trace!("options load started");

    let source = Rc::downgrade(inner);
    let task = async move {
        match outcome.await {
            Ok(value) => match source.upgrade() {
                Some(inner) => apply(inner, value),
                None => trace!("options load finished after teardown"),
            },
            Err(err) => debug!(%err, "options load failed"),
        }
    };
    if let Err(err) = spawner.spawn_local_obj(task.boxed_local().into()) {
        warn!(%err, "could not spawn options load");
        let mut variant = inner.variant.borrow_mut();
        if let Some(load) = slot(&mut *variant) {
            load.outcome = None;
        }
    }
}
