//! Single-slot broadcast cell with replay-on-subscribe.
//!
//! A [`Subject`] holds the latest value of `T` and a list of subscriber
//! callbacks. Subscribing replays the current value immediately, and every
//! [`Subject::set`] pushes the new value to all live subscribers, in
//! registration order, before returning.
//!
//! Subjects are single-threaded (`Rc<RefCell<..>>`). A callback must not call
//! `set` on the subject that is currently invoking it; doing so panics on the
//! callback's own `RefCell` borrow. Subscribing or dropping subscriptions from
//! inside a callback is fine and takes effect for the next `set`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct SubjectInner<T> {
    value: Option<T>,
    next_subscriber_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

/// Broadcast cell holding the latest value of `T`.
pub struct Subject<T> {
    inner: Rc<RefCell<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SubjectInner {
                value: None,
                next_subscriber_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Subject")
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Subject<T> {
    /// Create a subject with no value yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subject already holding `value`
    pub fn with_value(value: T) -> Self {
        let subject = Self::new();
        subject.inner.borrow_mut().value = Some(value);
        subject
    }

    /// Clone of the latest value, if one was ever set
    pub fn value(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Register `callback`. If a value is present it is delivered before this
    /// returns. The callback stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        let callback: Callback<T> = Rc::new(RefCell::new(callback));

        let (id, current) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_subscriber_id;
            inner.next_subscriber_id += 1;
            inner.subscribers.push((id, Rc::clone(&callback)));
            (id, inner.value.clone())
        };

        if let Some(value) = current {
            (&mut *callback.borrow_mut())(&value);
        }

        let weak: Weak<RefCell<SubjectInner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Store `value` and deliver it to every current subscriber.
    pub fn set(&self, value: T) {
        // Snapshot the callback list so callbacks may (un)subscribe freely.
        let subscribers: Vec<Callback<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.value = Some(value.clone());
            inner
                .subscribers
                .iter()
                .map(|(_, cb)| Rc::clone(cb))
                .collect()
        };

        log::trace!("subject: publishing to {} subscriber(s)", subscribers.len());

        for callback in subscribers {
            (&mut *callback.borrow_mut())(&value);
        }
    }

    /// Read-only view handed out to observers
    pub fn observable(&self) -> Observable<T> {
        Observable {
            subject: self.clone(),
        }
    }
}

/// Read-only handle to a [`Subject`]: observers can subscribe and read the
/// latest value but cannot publish.
pub struct Observable<T> {
    subject: Subject<T>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable").field(&self.subject).finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn value(&self) -> Option<T> {
        self.subject.value()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        self.subject.subscribe(callback)
    }
}

/// Guard returned by `subscribe`. Dropping it removes the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Remove the callback now
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(&T) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |v: &T| sink.borrow_mut().push(v.clone()))
    }

    #[test]
    fn test_subscribe_without_value_does_not_fire() {
        let subject: Subject<i32> = Subject::new();
        let (seen, cb) = recorder::<i32>();
        let _sub = subject.subscribe(cb);

        assert!(seen.borrow().is_empty());
        assert_eq!(subject.value(), None);
    }

    #[test]
    fn test_subscribe_replays_latest_value() {
        let subject = Subject::new();
        subject.set(1);
        subject.set(2);

        let (seen, cb) = recorder::<i32>();
        let _sub = subject.subscribe(cb);

        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn test_set_fans_out_in_subscription_order() {
        let subject = Subject::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&order);
        let _a = subject.subscribe(move |v: &i32| first.borrow_mut().push(("a", *v)));
        let second = Rc::clone(&order);
        let _b = subject.subscribe(move |v: &i32| second.borrow_mut().push(("b", *v)));

        subject.set(7);

        assert_eq!(*order.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let subject = Subject::with_value(0);
        let (seen, cb) = recorder::<i32>();
        let sub = subject.subscribe(cb);
        assert_eq!(subject.subscriber_count(), 1);

        drop(sub);
        subject.set(5);

        assert_eq!(subject.subscriber_count(), 0);
        assert_eq!(*seen.borrow(), vec![0]);
    }

    #[test]
    fn test_subscription_outliving_subject_is_harmless() {
        let subject = Subject::with_value(String::from("x"));
        let sub = subject.subscribe(|_| {});
        drop(subject);
        sub.unsubscribe();
    }

    #[test]
    fn test_subscribe_from_inside_callback() {
        let subject = Subject::new();
        let nested: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));
        let (seen, cb) = recorder::<i32>();
        let cb = RefCell::new(Some(cb));

        let handle = subject.clone();
        let holder = Rc::clone(&nested);
        let _outer = subject.subscribe(move |_: &i32| {
            if let Some(cb) = cb.borrow_mut().take() {
                holder.borrow_mut().push(handle.subscribe(cb));
            }
        });

        subject.set(1);
        // Nested subscriber got the replay, then the next publish.
        subject.set(2);

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_observable_reads_through() {
        let subject = Subject::with_value(3);
        let observable = subject.observable();
        let (seen, cb) = recorder::<i32>();
        let _sub = observable.subscribe(cb);

        subject.set(4);

        assert_eq!(observable.value(), Some(4));
        assert_eq!(*seen.borrow(), vec![3, 4]);
    }
}
