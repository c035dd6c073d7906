//! Request dispatch: the worker-side state machine.
//!
//! One `Dispatcher` owns the hosted root object and the handle table. Every
//! request resolves its target, performs the operation, and runs the result
//! through the value-vs-proxy decision: encode first, and only fall back to
//! a handle when encoding fails. Dispatch itself never fails — any error
//! becomes an `error` response and the loop moves on.

use crate::object::{HostObject, ObjectError, ObjectValue};
use crate::trace::debug;
use crate::wire::envelope::{ErrorKind, Op, Request, Response, Target};
use crate::wire::value::Value;
use crate::wire::{Handle, codec};
use crate::worker::handles::{HandleEntry, HandleTable};

/// Worker-side dispatcher for one hosted object.
pub struct Dispatcher {
    root: Box<dyn HostObject>,
    handles: HandleTable,
}

impl Dispatcher {
    /// Creates a dispatcher hosting `root`.
    #[must_use]
    pub fn new(root: Box<dyn HostObject>) -> Self {
        Self {
            root,
            handles: HandleTable::new(),
        }
    }

    /// Number of live handles, for observability and tests.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Executes one request and produces its response.
    pub fn dispatch(&mut self, request: Request) -> Response {
        let Request { target, op } = request;
        match op {
            Op::GetAttr { name } => self.get_attr(target, &name),
            Op::CallMethod { name, args, kwargs } => {
                self.call_method(target, &name, &args, &kwargs)
            }
            Op::IterStart => self.iter_start(target),
            Op::IterNext => self.iter_next(target),
            Op::Release => self.release(target),
        }
    }

    fn get_attr(&mut self, target: Target, name: &str) -> Response {
        let result = match target {
            Target::Root => self.root.get_attr(name),
            Target::Handle(handle) => match self.handles.resolve(handle) {
                None => return unknown_handle(handle),
                Some(HandleEntry::Object(obj)) => obj.get_attr(name),
                Some(HandleEntry::Iter { type_name, .. }) => {
                    Err(ObjectError::AttributeNotFound {
                        type_name: type_name.clone(),
                        name: name.to_owned(),
                    })
                }
            },
        };
        match result {
            Ok(value) => self.complete(value),
            Err(err) => error_response(err),
        }
    }

    fn call_method(
        &mut self,
        target: Target,
        name: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Response {
        let result = match target {
            Target::Root => self.root.call_method(name, args, kwargs),
            Target::Handle(handle) => match self.handles.resolve(handle) {
                None => return unknown_handle(handle),
                Some(HandleEntry::Object(obj)) => obj.call_method(name, args, kwargs),
                Some(HandleEntry::Iter { type_name, .. }) => Err(ObjectError::MethodNotFound {
                    type_name: type_name.clone(),
                    name: name.to_owned(),
                }),
            },
        };
        match result {
            Ok(value) => self.complete(value),
            Err(err) => error_response(err),
        }
    }

    fn iter_start(&mut self, target: Target) -> Response {
        let produced = match target {
            Target::Root => {
                let label = self.root.type_name().to_owned();
                self.root.iterate().map(|iter| (iter, label))
            }
            Target::Handle(handle) => match self.handles.resolve(handle) {
                None => return unknown_handle(handle),
                Some(HandleEntry::Object(obj)) => {
                    let label = obj.type_name().to_owned();
                    obj.iterate().map(|iter| (iter, label))
                }
                Some(HandleEntry::Iter { type_name, .. }) => Err(ObjectError::NotIterable {
                    type_name: type_name.clone(),
                }),
            },
        };
        match produced {
            Ok((iter, base)) => {
                let type_name = format!("{base}_iterator");
                let handle = self.handles.register(HandleEntry::Iter {
                    iter,
                    type_name: type_name.clone(),
                });
                debug!(handle = %handle, type_name = %type_name, "iterator bound");
                Response::Proxy { handle, type_name }
            }
            Err(err) => error_response(err),
        }
    }

    fn iter_next(&mut self, target: Target) -> Response {
        let Target::Handle(handle) = target else {
            return Response::Error {
                kind: ErrorKind::NotIterable,
                message: "root target holds no iterator state".into(),
            };
        };
        let step = match self.handles.resolve(handle) {
            None => return unknown_handle(handle),
            Some(HandleEntry::Iter { iter, .. }) => iter.next(),
            Some(HandleEntry::Object(obj)) => {
                return Response::Error {
                    kind: ErrorKind::NotIterable,
                    message: format!("`{}` holds no iterator state", obj.type_name()),
                };
            }
        };
        match step {
            Some(value) => self.complete(value),
            None => Response::Stop,
        }
    }

    fn release(&mut self, target: Target) -> Response {
        if let Target::Handle(handle) = target {
            self.handles.release(handle);
        }
        // Always acknowledged with an empty payload, even for unknown
        // handles or the root target.
        Response::Value { bytes: Vec::new() }
    }

    /// The value-vs-proxy decision.
    ///
    /// Plain data is encoded and returned by value. A live object gets one
    /// snapshot attempt; after the first failure it is referenced — a handle
    /// is issued and the object parked in the table.
    fn complete(&mut self, value: ObjectValue) -> Response {
        match value {
            ObjectValue::Value(v) => match codec::encode(&v) {
                Ok(bytes) => Response::Value { bytes },
                Err(err) => Response::Error {
                    kind: ErrorKind::Serialization,
                    message: err.to_string(),
                },
            },
            ObjectValue::Object(obj) => {
                if let Ok(snapshot) = obj.snapshot()
                    && let Ok(bytes) = codec::encode(&snapshot)
                {
                    return Response::Value { bytes };
                }
                let type_name = obj.type_name().to_owned();
                let handle = self.handles.register(HandleEntry::Object(obj));
                debug!(handle = %handle, type_name = %type_name, "result returned by proxy");
                Response::Proxy { handle, type_name }
            }
        }
    }
}

fn unknown_handle(handle: Handle) -> Response {
    Response::Error {
        kind: ErrorKind::UnknownHandle,
        message: format!("no live object for handle {handle}"),
    }
}

fn error_response(err: ObjectError) -> Response {
    match err {
        ObjectError::Raised { kind, message } => Response::Error {
            kind: ErrorKind::Invocation { kind },
            message,
        },
        ObjectError::AttributeNotFound { .. } => Response::Error {
            kind: ErrorKind::AttributeNotFound,
            message: err.to_string(),
        },
        ObjectError::MethodNotFound { .. } => Response::Error {
            kind: ErrorKind::MethodNotFound,
            message: err.to_string(),
        },
        ObjectError::NotIterable { .. } => Response::Error {
            kind: ErrorKind::NotIterable,
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectIter, arg};
    use crate::wire::ToValue;

    /// Nested object reachable through an attribute; proxy-only.
    struct Arith;

    impl HostObject for Arith {
        fn type_name(&self) -> &str {
            "Arith"
        }

        fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
            Err(ObjectError::AttributeNotFound {
                type_name: "Arith".into(),
                name: name.to_owned(),
            })
        }

        fn call_method(
            &mut self,
            name: &str,
            args: &[Value],
            _kwargs: &[(String, Value)],
        ) -> Result<ObjectValue, ObjectError> {
            match name {
                "multiply" => {
                    let x: i64 = arg(args, 0, "multiply")?;
                    let y: i64 = arg(args, 1, "multiply")?;
                    Ok(ObjectValue::value(x * y))
                }
                _ => Err(ObjectError::MethodNotFound {
                    type_name: "Arith".into(),
                    name: name.to_owned(),
                }),
            }
        }
    }

    /// Object whose snapshot deliberately fails; reachable only by proxy.
    struct Vault {
        stored: i64,
    }

    impl HostObject for Vault {
        fn type_name(&self) -> &str {
            "Vault"
        }

        fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
            Err(ObjectError::AttributeNotFound {
                type_name: "Vault".into(),
                name: name.to_owned(),
            })
        }

        fn call_method(
            &mut self,
            name: &str,
            args: &[Value],
            _kwargs: &[(String, Value)],
        ) -> Result<ObjectValue, ObjectError> {
            match name {
                "get_value" => Ok(ObjectValue::value(self.stored)),
                "deposit" => {
                    let amount: i64 = arg(args, 0, "deposit")?;
                    self.stored += amount;
                    Ok(ObjectValue::value(self.stored))
                }
                _ => Err(ObjectError::MethodNotFound {
                    type_name: "Vault".into(),
                    name: name.to_owned(),
                }),
            }
        }
    }

    /// Object that opts in to by-value transfer.
    struct Point {
        x: i64,
        y: i64,
    }

    impl HostObject for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
            match name {
                "x" => Ok(ObjectValue::value(self.x)),
                "y" => Ok(ObjectValue::value(self.y)),
                _ => Err(ObjectError::AttributeNotFound {
                    type_name: "Point".into(),
                    name: name.to_owned(),
                }),
            }
        }

        fn call_method(
            &mut self,
            name: &str,
            _args: &[Value],
            _kwargs: &[(String, Value)],
        ) -> Result<ObjectValue, ObjectError> {
            Err(ObjectError::MethodNotFound {
                type_name: "Point".into(),
                name: name.to_owned(),
            })
        }

        fn snapshot(&self) -> Result<Value, crate::wire::SerializationFailure> {
            let mut map = std::collections::BTreeMap::new();
            map.insert("x".to_owned(), self.x.to_value());
            map.insert("y".to_owned(), self.y.to_value());
            Ok(Value::Map(map))
        }
    }

    /// Root fixture mirroring the worker's hosted object in the api tests.
    struct Api {
        value: i64,
        items: Vec<i64>,
    }

    impl Api {
        fn new() -> Self {
            Self {
                value: 42,
                items: vec![1, 2, 3],
            }
        }
    }

    impl HostObject for Api {
        fn type_name(&self) -> &str {
            "Api"
        }

        fn get_attr(&self, name: &str) -> Result<ObjectValue, ObjectError> {
            match name {
                "value" => Ok(ObjectValue::value(self.value)),
                "nested" => Ok(ObjectValue::object(Arith)),
                "vault" => Ok(ObjectValue::object(Vault { stored: 99 })),
                "origin" => Ok(ObjectValue::object(Point { x: 0, y: 0 })),
                _ => Err(ObjectError::AttributeNotFound {
                    type_name: "Api".into(),
                    name: name.to_owned(),
                }),
            }
        }

        fn call_method(
            &mut self,
            name: &str,
            args: &[Value],
            _kwargs: &[(String, Value)],
        ) -> Result<ObjectValue, ObjectError> {
            match name {
                "add" => {
                    let a: i64 = arg(args, 0, "add")?;
                    let b: i64 = arg(args, 1, "add")?;
                    Ok(ObjectValue::value(a + b))
                }
                "get_vault" => Ok(ObjectValue::object(Vault { stored: 99 })),
                "fail" => Err(ObjectError::raised("ValueError", "Intentional error")),
                _ => Err(ObjectError::MethodNotFound {
                    type_name: "Api".into(),
                    name: name.to_owned(),
                }),
            }
        }

        fn iterate(&self) -> Result<ObjectIter, ObjectError> {
            let items = self.items.clone();
            Ok(Box::new(items.into_iter().map(ObjectValue::value)))
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Box::new(Api::new()))
    }

    fn get_attr(d: &mut Dispatcher, target: Target, name: &str) -> Response {
        d.dispatch(Request {
            target,
            op: Op::GetAttr {
                name: name.to_owned(),
            },
        })
    }

    fn call(d: &mut Dispatcher, target: Target, name: &str, args: Vec<Value>) -> Response {
        d.dispatch(Request {
            target,
            op: Op::CallMethod {
                name: name.to_owned(),
                args,
                kwargs: Vec::new(),
            },
        })
    }

    fn value_of(response: Response) -> Value {
        match response {
            Response::Value { bytes } => codec::decode(&bytes).unwrap(),
            other => panic!("expected ok_value, got {other:?}"),
        }
    }

    fn proxy_of(response: Response) -> (Handle, String) {
        match response {
            Response::Proxy { handle, type_name } => (handle, type_name),
            other => panic!("expected ok_proxy, got {other:?}"),
        }
    }

    #[test]
    fn plain_attribute_returns_by_value() {
        let mut d = dispatcher();
        let resp = get_attr(&mut d, Target::Root, "value");
        assert_eq!(value_of(resp), Value::Int(42));
        assert_eq!(d.live_handles(), 0);
    }

    #[test]
    fn unknown_attribute_is_reported() {
        let mut d = dispatcher();
        match get_attr(&mut d, Target::Root, "missing") {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::AttributeNotFound),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_failure_falls_back_to_proxy() {
        let mut d = dispatcher();
        let (_, type_name) = proxy_of(get_attr(&mut d, Target::Root, "vault"));
        assert_eq!(type_name, "Vault");
        assert_eq!(d.live_handles(), 1);
    }

    #[test]
    fn snapshot_success_returns_by_value() {
        let mut d = dispatcher();
        let value = value_of(get_attr(&mut d, Target::Root, "origin"));
        match value {
            Value::Map(map) => assert_eq!(map.get("x"), Some(&Value::Int(0))),
            other => panic!("expected map, got {other:?}"),
        }
        assert_eq!(d.live_handles(), 0);
    }

    #[test]
    fn proxied_object_is_reachable_through_its_handle() {
        let mut d = dispatcher();
        let (handle, _) = proxy_of(get_attr(&mut d, Target::Root, "nested"));
        let resp = call(
            &mut d,
            Target::Handle(handle),
            "multiply",
            vec![Value::Int(3), Value::Int(4)],
        );
        assert_eq!(value_of(resp), Value::Int(12));
    }

    #[test]
    fn separate_calls_produce_independent_proxies() {
        let mut d = dispatcher();
        let (a, _) = proxy_of(call(&mut d, Target::Root, "get_vault", vec![]));
        let (b, _) = proxy_of(call(&mut d, Target::Root, "get_vault", vec![]));
        assert_ne!(a, b);

        // Mutating one must not affect the other.
        call(&mut d, Target::Handle(a), "deposit", vec![Value::Int(1)]);
        let resp = call(&mut d, Target::Handle(b), "get_value", vec![]);
        assert_eq!(value_of(resp), Value::Int(99));
    }

    #[test]
    fn raised_errors_become_invocation_responses() {
        let mut d = dispatcher();
        match call(&mut d, Target::Root, "fail", vec![]) {
            Response::Error { kind, message } => {
                assert_eq!(
                    kind,
                    ErrorKind::Invocation {
                        kind: "ValueError".into()
                    }
                );
                assert_eq!(message, "Intentional error");
            }
            other => panic!("expected error, got {other:?}"),
        }

        // The dispatcher survives and keeps serving.
        let resp = call(
            &mut d,
            Target::Root,
            "add",
            vec![Value::Int(2), Value::Int(3)],
        );
        assert_eq!(value_of(resp), Value::Int(5));
    }

    #[test]
    fn stale_handles_are_reported() {
        let mut d = dispatcher();
        match get_attr(&mut d, Target::Handle(Handle::from_raw(777)), "value") {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::UnknownHandle),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn iteration_walks_the_sequence_then_stops() {
        let mut d = dispatcher();
        let (iter_handle, label) = proxy_of(d.dispatch(Request {
            target: Target::Root,
            op: Op::IterStart,
        }));
        assert_eq!(label, "Api_iterator");

        let mut seen = Vec::new();
        loop {
            match d.dispatch(Request {
                target: Target::Handle(iter_handle),
                op: Op::IterNext,
            }) {
                Response::Stop => break,
                resp => seen.push(value_of(resp)),
            }
        }
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        // An exhausted iterator keeps answering stop, not an error.
        assert_eq!(
            d.dispatch(Request {
                target: Target::Handle(iter_handle),
                op: Op::IterNext,
            }),
            Response::Stop
        );
    }

    #[test]
    fn reiteration_starts_fresh() {
        let mut d = dispatcher();
        for _ in 0..2 {
            let (h, _) = proxy_of(d.dispatch(Request {
                target: Target::Root,
                op: Op::IterStart,
            }));
            let first = d.dispatch(Request {
                target: Target::Handle(h),
                op: Op::IterNext,
            });
            assert_eq!(value_of(first), Value::Int(1));
        }
    }

    #[test]
    fn iter_next_without_iterator_state_is_an_error() {
        let mut d = dispatcher();
        let (vault, _) = proxy_of(get_attr(&mut d, Target::Root, "vault"));
        match d.dispatch(Request {
            target: Target::Handle(vault),
            op: Op::IterNext,
        }) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotIterable),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn release_is_idempotent_and_always_acknowledged() {
        let mut d = dispatcher();
        let (handle, _) = proxy_of(get_attr(&mut d, Target::Root, "vault"));
        assert_eq!(d.live_handles(), 1);

        for target in [
            Target::Handle(handle),
            Target::Handle(handle),
            Target::Handle(Handle::from_raw(4242)),
            Target::Root,
        ] {
            match d.dispatch(Request {
                target,
                op: Op::Release,
            }) {
                Response::Value { bytes } => assert!(bytes.is_empty()),
                other => panic!("expected ok_value, got {other:?}"),
            }
        }
        assert_eq!(d.live_handles(), 0);

        // The released handle is now stale.
        match call(&mut d, Target::Handle(handle), "get_value", vec![]) {
            Response::Error { kind, .. } => assert_eq!(kind, ErrorKind::UnknownHandle),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
