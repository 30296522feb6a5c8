//! 同步事件总线
//!
//! 每个事件发布者独占一个总线实例，不跨发布者共享。
//! 触发时按订阅顺序在调用方任务上同步执行回调，不做重新调度或批量合并。
//!
//! 回调执行期间不持有总线锁，因此回调内部可以安全地订阅、退订
//! （包括退订自己）。一次触发开始时会对订阅列表做快照，
//! 回调中新增的订阅从下一次触发开始生效。

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// 可按名称路由的事件
pub trait BusEvent {
    /// 事件类型名称，如 `progress`、`upload:start`
    fn event_type(&self) -> &str;

    /// 构造只带名称的占位事件，off 用它对过滤器求值
    ///
    /// 无法凭名称构造的事件返回 None，此时只有 on/once 注册的订阅可按名称释放
    fn named(_name: &str) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

type Callback<E> = Box<dyn Fn(&E) + Send + Sync>;

/// 订阅过滤器
pub type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// 订阅选项
pub struct ListenerOptions<E> {
    /// 过滤器，返回 false 时跳过该订阅
    pub filter: Option<Predicate<E>>,
    /// 首次命中后自动释放
    pub once: bool,
}

impl<E> Default for ListenerOptions<E> {
    fn default() -> Self {
        Self {
            filter: None,
            once: false,
        }
    }
}

struct Listener<E> {
    id: u64,
    callback: Callback<E>,
    /// 通过 on/once 注册时记录的事件名，供 off 使用
    name: Option<String>,
    filter: Option<Predicate<E>>,
    once: bool,
    active: AtomicBool,
    disposed: AtomicBool,
    fire_count: AtomicU64,
    last_fired: Mutex<Option<DateTime<Local>>>,
}

impl<E> Listener<E> {
    /// 触发回调，返回 true 表示一次性订阅已命中，需要移除
    fn fire(&self, event: &E) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }

        if let Some(filter) = &self.filter {
            if !filter(event) {
                return false;
            }
        }

        // 一次性订阅先占位再回调，回调内重入触发同名事件时不会再次命中
        if self.once {
            if self.disposed.swap(true, Ordering::SeqCst) {
                return false;
            }
            self.active.store(false, Ordering::SeqCst);
        }

        (self.callback)(event);

        *self.last_fired.lock() = Some(Local::now());
        self.fire_count.fetch_add(1, Ordering::SeqCst);

        self.once
    }

    fn mark_disposed(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.disposed.store(true, Ordering::SeqCst);
    }
}

struct BusInner<E> {
    next_id: u64,
    listeners: Vec<Arc<Listener<E>>>,
}

impl<E> BusInner<E> {
    fn remove(&mut self, id: u64) -> bool {
        match self.listeners.iter().position(|l| l.id == id) {
            Some(index) => {
                self.listeners.remove(index);
                true
            }
            None => false,
        }
    }
}

/// 订阅句柄
///
/// 可暂停/恢复（保留原有顺序），也可主动释放
pub struct Subscription<E> {
    listener: Arc<Listener<E>>,
    bus: Weak<Mutex<BusInner<E>>>,
}

impl<E> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            bus: Weak::clone(&self.bus),
        }
    }
}

impl<E> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.listener.id)
            .field("name", &self.listener.name)
            .field("active", &self.is_active())
            .field("fire_count", &self.fire_count())
            .finish()
    }
}

impl<E> Subscription<E> {
    /// 订阅 ID（同一总线内唯一）
    pub fn id(&self) -> u64 {
        self.listener.id
    }

    /// 暂停：保留注册位置，但触发时跳过
    pub fn pause(&self) {
        self.listener.active.store(false, Ordering::SeqCst);
    }

    /// 恢复已暂停的订阅，已释放的订阅不会被恢复
    pub fn resume(&self) {
        if !self.listener.disposed.load(Ordering::SeqCst) {
            self.listener.active.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_active(&self) -> bool {
        self.listener.active.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.listener.disposed.load(Ordering::SeqCst)
    }

    /// 已触发次数
    pub fn fire_count(&self) -> u64 {
        self.listener.fire_count.load(Ordering::SeqCst)
    }

    /// 最近一次触发时间
    pub fn last_fired(&self) -> Option<DateTime<Local>> {
        *self.listener.last_fired.lock()
    }

    /// 释放订阅并从所属总线移除
    pub fn dispose(&self) {
        self.listener.mark_disposed();

        if let Some(bus) = self.bus.upgrade() {
            EventBus::remove_listener(&bus, self.listener.id);
        }
    }
}

/// 事件总线
pub struct EventBus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 1,
                listeners: Vec::new(),
            })),
        }
    }

    /// 当前订阅数
    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 订阅全部事件
    pub fn subscribe<F>(&self, callback: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Box::new(callback), None, ListenerOptions::default())
    }

    /// 订阅满足过滤条件的事件
    pub fn subscribe_filtered<F, P>(&self, callback: F, predicate: P) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.register(
            Box::new(callback),
            None,
            ListenerOptions {
                filter: Some(Box::new(predicate)),
                once: false,
            },
        )
    }

    /// 按选项订阅
    pub fn subscribe_with<F>(&self, callback: F, options: ListenerOptions<E>) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Box::new(callback), None, options)
    }

    fn register(
        &self,
        callback: Callback<E>,
        name: Option<String>,
        options: ListenerOptions<E>,
    ) -> Subscription<E> {
        let mut inner = self.inner.lock();

        let id = inner.next_id;
        inner.next_id += 1;

        let listener = Arc::new(Listener {
            id,
            callback,
            name,
            filter: options.filter,
            once: options.once,
            active: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            fire_count: AtomicU64::new(0),
            last_fired: Mutex::new(None),
        });

        inner.listeners.push(Arc::clone(&listener));

        Subscription {
            listener,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 同步触发事件
    pub fn trigger(&self, event: E) {
        let snapshot: Vec<Arc<Listener<E>>> = self.inner.lock().listeners.clone();

        for listener in snapshot {
            if listener.fire(&event) {
                Self::remove_listener(&self.inner, listener.id);
            }
        }
    }

    /// 退订
    pub fn unsubscribe(&self, subscription: &Subscription<E>) {
        subscription.listener.mark_disposed();
        Self::remove_listener(&self.inner, subscription.listener.id);
    }

    /// 强制清空所有订阅
    pub fn dispose(&self) {
        let drained: Vec<Arc<Listener<E>>> = self.inner.lock().listeners.drain(..).collect();

        for listener in &drained {
            listener.mark_disposed();
        }

        if !drained.is_empty() {
            trace!("事件总线已释放 {} 个订阅", drained.len());
        }
    }

    fn remove_listener(inner: &Arc<Mutex<BusInner<E>>>, id: u64) {
        let mut guard = inner.lock();

        // 最后一个订阅被移除时，总线回到初始状态
        if guard.remove(id) && guard.listeners.is_empty() {
            guard.listeners.shrink_to_fit();
        }
    }
}

impl<E: BusEvent + 'static> EventBus<E> {
    /// 订阅指定名称的事件
    pub fn on<F>(&self, name: &str, callback: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(
            Box::new(callback),
            Some(name.to_string()),
            ListenerOptions {
                filter: Some(name_filter(name)),
                once: false,
            },
        )
    }

    /// 订阅指定名称的事件，首次命中后自动释放
    pub fn once<F>(&self, name: &str, callback: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(
            Box::new(callback),
            Some(name.to_string()),
            ListenerOptions {
                filter: Some(name_filter(name)),
                once: true,
            },
        )
    }

    /// 释放所有过滤器接受该名称事件的订阅
    ///
    /// 无过滤器的订阅不受影响
    pub fn off(&self, name: &str) {
        let placeholder = E::named(name);
        let snapshot: Vec<Arc<Listener<E>>> = self.inner.lock().listeners.clone();

        // 过滤器在锁外求值
        let matched: Vec<Arc<Listener<E>>> = snapshot
            .into_iter()
            .filter(|l| match (&l.filter, &placeholder) {
                _ if l.name.as_deref() == Some(name) => true,
                (Some(filter), Some(event)) => filter(event),
                _ => false,
            })
            .collect();

        for listener in matched {
            listener.mark_disposed();
            Self::remove_listener(&self.inner, listener.id);
        }
    }
}

fn name_filter<E: BusEvent + 'static>(name: &str) -> Predicate<E> {
    let name = name.to_string();
    Box::new(move |e: &E| e.event_type() == name)
}

/// 动态事件：`{ "type": name, ...data }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl DynamicEvent {
    pub fn new(name: &str) -> Self {
        Self {
            event_type: name.to_string(),
            data: serde_json::Map::new(),
        }
    }
}

impl BusEvent for DynamicEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn named(name: &str) -> Option<Self> {
        Some(DynamicEvent::new(name))
    }
}

impl EventBus<DynamicEvent> {
    /// 按名称触发：对象数据的字段合并到事件上，其他值挂在 `data` 字段下
    pub fn trigger_named(&self, name: &str, data: Option<serde_json::Value>) {
        let mut event = DynamicEvent::new(name);

        match data {
            Some(serde_json::Value::Object(map)) => {
                for (key, value) in map {
                    if key != "type" {
                        event.data.insert(key, value);
                    }
                }
            }
            Some(other) => {
                event.data.insert("data".to_string(), other);
            }
            None => {}
        }

        self.trigger(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&DynamicEvent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Box::new(move |e: &DynamicEvent| {
                log.lock().push(format!("{}:{}", tag, e.event_type));
            }) as Box<dyn Fn(&DynamicEvent) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_trigger_in_subscription_order() {
        let bus = EventBus::<DynamicEvent>::new();
        let (log, make) = recorder();

        bus.subscribe(make("a"));
        bus.subscribe(make("b"));
        bus.subscribe(make("c"));

        bus.trigger_named("ping", None);

        assert_eq!(*log.lock(), vec!["a:ping", "b:ping", "c:ping"]);
    }

    #[test]
    fn test_on_filters_by_name() {
        let bus = EventBus::<DynamicEvent>::new();
        let (log, make) = recorder();

        bus.on("progress", make("p"));
        bus.on("complete", make("c"));

        bus.trigger_named("progress", None);
        bus.trigger_named("complete", None);
        bus.trigger_named("progress", None);

        assert_eq!(*log.lock(), vec!["p:progress", "c:complete", "p:progress"]);
    }

    #[test]
    fn test_once_fires_only_first_time() {
        let bus = EventBus::<DynamicEvent>::new();
        let (log, make) = recorder();

        let sub = bus.once("start", make("s"));
        bus.on("start", make("keep"));

        bus.trigger_named("start", None);
        bus.trigger_named("start", None);

        assert_eq!(*log.lock(), vec!["s:start", "keep:start", "keep:start"]);
        assert!(sub.is_disposed());
        assert_eq!(sub.fire_count(), 1);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_off_disposes_matching_subscriptions() {
        let bus = EventBus::<DynamicEvent>::new();
        let (log, make) = recorder();

        let a = bus.on("cancel", make("a"));
        bus.on("cancel", make("b"));
        bus.on("error", make("e"));
        let f = bus.subscribe_filtered(make("f"), |e| e.event_type == "cancel");
        // 无过滤器的订阅保留
        bus.subscribe(make("all"));

        bus.off("cancel");
        bus.trigger_named("cancel", None);
        bus.trigger_named("error", None);

        assert!(a.is_disposed());
        assert!(f.is_disposed());
        assert_eq!(bus.len(), 2);
        assert_eq!(*log.lock(), vec!["all:cancel", "e:error", "all:error"]);
    }

    #[test]
    fn test_once_reentrant_trigger_fires_once() {
        let bus = Arc::new(EventBus::<DynamicEvent>::new());
        let hits = Arc::new(AtomicU64::new(0));

        let bus_clone = Arc::clone(&bus);
        let hits_clone = Arc::clone(&hits);
        let sub = bus.once("x", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            bus_clone.trigger_named("x", None);
        });

        bus.trigger_named("x", None);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sub.fire_count(), 1);
        assert!(sub.is_disposed());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_pause_resume_keeps_order() {
        let bus = EventBus::<DynamicEvent>::new();
        let (log, make) = recorder();

        let first = bus.subscribe(make("1"));
        bus.subscribe(make("2"));

        first.pause();
        bus.trigger_named("x", None);
        assert!(!first.is_active());

        first.resume();
        bus.trigger_named("y", None);

        assert_eq!(*log.lock(), vec!["2:x", "1:y", "2:y"]);
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_unsubscribe_last_empties_bus() {
        let bus = EventBus::<DynamicEvent>::new();
        let (_log, make) = recorder();

        let a = bus.subscribe(make("a"));
        let b = bus.subscribe(make("b"));

        bus.unsubscribe(&a);
        assert_eq!(bus.len(), 1);

        b.dispose();
        assert!(bus.is_empty());

        // 重复释放是安全的
        b.dispose();
        bus.unsubscribe(&a);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_dispose_clears_populated_bus() {
        let bus = EventBus::<DynamicEvent>::new();
        let (log, make) = recorder();

        let a = bus.subscribe(make("a"));
        bus.subscribe(make("b"));

        bus.dispose();
        bus.trigger_named("gone", None);

        assert!(bus.is_empty());
        assert!(log.lock().is_empty());

        // 已释放的订阅不能被恢复
        a.resume();
        assert!(!a.is_active());
    }

    #[test]
    fn test_reentrant_subscribe_applies_next_trigger() {
        let bus = Arc::new(EventBus::<DynamicEvent>::new());
        let count = Arc::new(AtomicU64::new(0));

        let bus_clone = Arc::clone(&bus);
        let count_clone = Arc::clone(&count);
        bus.once("spawn", move |_| {
            let count = Arc::clone(&count_clone);
            bus_clone.on("spawn", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.trigger_named("spawn", None);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.trigger_named("spawn", None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_dispose_itself() {
        let bus = Arc::new(EventBus::<DynamicEvent>::new());
        let slot: Arc<Mutex<Option<Subscription<DynamicEvent>>>> = Arc::new(Mutex::new(None));

        let slot_clone = Arc::clone(&slot);
        let sub = bus.subscribe(move |_| {
            if let Some(me) = slot_clone.lock().as_ref() {
                me.dispose();
            }
        });
        *slot.lock() = Some(sub.clone());

        bus.trigger_named("tick", None);
        assert!(sub.is_disposed());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_trigger_named_promotes_data() {
        let bus = EventBus::<DynamicEvent>::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = Arc::clone(&seen);
        bus.subscribe(move |e: &DynamicEvent| {
            *seen_clone.lock() = Some(e.clone());
        });

        bus.trigger_named("progress", Some(json!({ "loaded": 5, "total": 10 })));

        let event = seen.lock().clone().unwrap();
        assert_eq!(event.event_type, "progress");
        assert_eq!(event.data.get("loaded"), Some(&json!(5)));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "progress", "loaded": 5, "total": 10 })
        );
    }

    #[test]
    fn test_subscription_statistics() {
        let bus = EventBus::<DynamicEvent>::new();
        let sub = bus.subscribe(|_| {});

        assert!(sub.last_fired().is_none());
        bus.trigger_named("a", None);
        bus.trigger_named("b", None);

        assert_eq!(sub.fire_count(), 2);
        assert!(sub.last_fired().is_some());
    }
}
