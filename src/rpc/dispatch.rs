//! Method dispatch for listeners.
//!
//! A [`Dispatcher`] pairs every method of an interface descriptor with a
//! handler that decodes the arguments and calls into the server object.
//! Invocations are matched by name, arity and exact argument type, with
//! `Null` accepted for any parameter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::{CallError, ConfigError, RpcFailure};
use super::interface::InterfaceDescriptor;
use super::protocol::{Fault, Invocation};
use super::value::{FromValue, Value};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, CallError>> + Send>>;

type Handler<T> = Box<dyn Fn(Arc<T>, Arguments) -> HandlerFuture + Send + Sync>;

/// Positional arguments of one invocation, consumed in declaration order.
#[derive(Debug)]
pub struct Arguments {
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Decode the next argument.
    pub fn take<T: FromValue>(&mut self) -> Result<T, Fault> {
        let position = self.position;
        self.position += 1;

        let value = self
            .values
            .next()
            .ok_or_else(|| Fault::invalid_argument(format!("missing argument {}", position)))?;

        T::from_value(value).map_err(|fault| Fault {
            kind: fault.kind,
            message: format!("argument {}: {}", position, fault.message),
        })
    }
}

/// Signature table mapping each declared method to its handler.
pub struct Dispatcher<T> {
    interface: InterfaceDescriptor,
    handlers: Vec<Handler<T>>,
}

impl<T> Dispatcher<T> {
    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }
}

impl<T: Send + Sync + 'static> Dispatcher<T> {
    pub fn builder(interface: InterfaceDescriptor) -> DispatcherBuilder<T> {
        let slots = interface.methods().len();
        DispatcherBuilder {
            interface,
            handlers: (0..slots).map(|_| None).collect(),
            errors: Vec::new(),
        }
    }

    /// Invoke the matching method on `server`.
    ///
    /// Never fails the caller: method errors, decoding errors and panics all
    /// come back as a [`Fault`].
    pub async fn dispatch(&self, server: &Arc<T>, invocation: Invocation) -> Result<Value, Fault> {
        let Invocation { method, args } = invocation;

        let Some(index) = self
            .interface
            .methods()
            .iter()
            .position(|m| m.matches(&method, &args))
        else {
            warn!(
                interface = %self.interface.name(),
                method = %method,
                args = args.len(),
                "No method matches invocation"
            );
            return Err(Fault::no_such_method(&method));
        };

        debug!(interface = %self.interface.name(), method = %method, "Dispatching");

        let call = (self.handlers[index])(Arc::clone(server), Arguments::new(args));

        // Run in its own task so a panicking method cannot take the connection down.
        match tokio::spawn(call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CallError::Remote(fault))) => Err(fault),
            Ok(Err(CallError::Rpc(RpcFailure::Rejected(fault)))) => Err(fault),
            Ok(Err(CallError::Rpc(failure))) => Err(Fault::rpc(failure.to_string())),
            Err(e) if e.is_panic() => {
                warn!(method = %method, "Method panicked");
                Err(Fault::internal(format!("method {} panicked", method)))
            }
            Err(_) => Err(Fault::internal(format!("method {} was cancelled", method))),
        }
    }
}

/// Collects handlers, then checks them against the interface in [`build`](Self::build).
pub struct DispatcherBuilder<T> {
    interface: InterfaceDescriptor,
    handlers: Vec<Option<Handler<T>>>,
    errors: Vec<ConfigError>,
}

impl<T: Send + Sync + 'static> DispatcherBuilder<T> {
    /// Register the handler for the only method called `name`.
    pub fn handle<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        let matches: Vec<usize> = self
            .interface
            .methods()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name == name)
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [index] => self.set(*index, handler),
            [] => {
                let error = self.unknown(name);
                self.errors.push(error);
            }
            _ => self.errors.push(ConfigError::AmbiguousHandler {
                interface: self.interface.name().to_string(),
                method: name.to_string(),
            }),
        }
        self
    }

    /// Register the handler for the overload of `name` taking `arity` arguments.
    pub fn handle_overload<F, Fut>(mut self, name: &str, arity: usize, handler: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        let index = self
            .interface
            .methods()
            .iter()
            .position(|m| m.name == name && m.arity() == arity);

        match index {
            Some(index) => self.set(index, handler),
            None => {
                let error = self.unknown(name);
                self.errors.push(error);
            }
        }
        self
    }

    pub fn build(self) -> Result<Dispatcher<T>, ConfigError> {
        self.interface.validate()?;

        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for (slot, method) in self.handlers.into_iter().zip(self.interface.methods()) {
            match slot {
                Some(handler) => handlers.push(handler),
                None => {
                    return Err(ConfigError::MissingHandler {
                        interface: self.interface.name().to_string(),
                        method: method.name.clone(),
                    });
                }
            }
        }

        Ok(Dispatcher {
            interface: self.interface,
            handlers,
        })
    }

    fn set<F, Fut>(&mut self, index: usize, handler: F)
    where
        F: Fn(Arc<T>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        let boxed: Handler<T> = Box::new(move |server: Arc<T>, args: Arguments| -> HandlerFuture {
            Box::pin(handler(server, args))
        });
        self.handlers[index] = Some(boxed);
    }

    fn unknown(&self, name: &str) -> ConfigError {
        ConfigError::UnknownMethod {
            interface: self.interface.name().to_string(),
            method: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::FaultKind;
    use crate::rpc::value::TypeTag;

    struct Calculator;

    impl Calculator {
        async fn add(&self, a: i64, b: i64) -> Result<i64, CallError> {
            Ok(a + b)
        }

        async fn divide(&self, a: i64, b: i64) -> Result<i64, CallError> {
            if b == 0 {
                return Err(Fault::invalid_argument("division by zero").into());
            }
            Ok(a / b)
        }
    }

    fn interface() -> InterfaceDescriptor {
        InterfaceDescriptor::builder("Calculator")
            .method("add", &[TypeTag::Int, TypeTag::Int])
            .method("divide", &[TypeTag::Int, TypeTag::Int])
            .method("describe", &[TypeTag::Str])
            .method("describe", &[TypeTag::Str, TypeTag::Str])
            .method("explode", &[])
            .build()
    }

    fn dispatcher() -> Dispatcher<Calculator> {
        Dispatcher::builder(interface())
            .handle("add", |calc: Arc<Calculator>, mut args| async move {
                let a: i64 = args.take()?;
                let b: i64 = args.take()?;
                calc.add(a, b).await.map(Value::from)
            })
            .handle("divide", |calc: Arc<Calculator>, mut args| async move {
                let a: i64 = args.take()?;
                let b: i64 = args.take()?;
                calc.divide(a, b).await.map(Value::from)
            })
            .handle_overload("describe", 1, |_, mut args| async move {
                let s: Option<String> = args.take()?;
                Ok::<_, CallError>(Value::from(format!("one:{}", s.unwrap_or_default())))
            })
            .handle_overload("describe", 2, |_, mut args| async move {
                let a: String = args.take()?;
                let b: String = args.take()?;
                Ok::<_, CallError>(Value::from(format!("two:{}{}", a, b)))
            })
            .handle("explode", |_, _| async move {
                if true {
                    panic!("boom");
                }
                Ok::<_, CallError>(Value::Null)
            })
            .build()
            .unwrap()
    }

    async fn call(method: &str, args: Vec<Value>) -> Result<Value, Fault> {
        dispatcher()
            .dispatch(&Arc::new(Calculator), Invocation::new(method, args))
            .await
    }

    fn interface_name<T>(dispatcher: &Dispatcher<T>) -> &str {
        dispatcher.interface().name()
    }

    #[test]
    fn interface_needs_no_bounds_on_server() {
        assert_eq!(interface_name(&dispatcher()), "Calculator");
    }

    #[tokio::test]
    async fn dispatches_by_name_and_tags() {
        let result = call("add", vec![Value::Int(2), Value::Int(3)]).await;
        assert_eq!(result, Ok(Value::Int(5)));
    }

    #[tokio::test]
    async fn method_failure_is_returned_as_fault() {
        let fault = call("divide", vec![Value::Int(1), Value::Int(0)])
            .await
            .unwrap_err();
        assert_eq!(fault.kind, FaultKind::InvalidArgument);
        assert_eq!(fault.message, "division by zero");
    }

    #[tokio::test]
    async fn overloads_resolve_by_arity() {
        let one = call("describe", vec![Value::from("x")]).await;
        assert_eq!(one, Ok(Value::from("one:x")));

        let two = call("describe", vec![Value::from("x"), Value::from("y")]).await;
        assert_eq!(two, Ok(Value::from("two:xy")));
    }

    #[tokio::test]
    async fn null_argument_matches_any_parameter() {
        let result = call("describe", vec![Value::Null]).await;
        assert_eq!(result, Ok(Value::from("one:")));

        // Null reaches a handler that needs a value: the handler reports it
        let fault = call("add", vec![Value::Null, Value::Int(1)]).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::InvalidArgument);
        assert!(fault.message.starts_with("argument 0"));
    }

    #[tokio::test]
    async fn no_match_is_rpc_fault() {
        for (method, args) in [
            ("missing", vec![]),
            ("add", vec![Value::Int(1)]),
            ("add", vec![Value::from("1"), Value::Int(2)]),
        ] {
            let fault = call(method, args).await.unwrap_err();
            assert_eq!(fault.kind, FaultKind::Rpc);
            assert!(fault.message.contains("no such method"));
        }
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let fault = call("explode", vec![]).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Internal);
    }

    #[test]
    fn build_requires_every_handler() {
        let result = Dispatcher::<Calculator>::builder(interface())
            .handle("add", |_, _| async { Ok::<_, CallError>(Value::Null) })
            .build();
        assert!(matches!(result, Err(ConfigError::MissingHandler { .. })));
    }

    #[test]
    fn build_rejects_unknown_and_ambiguous_handlers() {
        let result = Dispatcher::<Calculator>::builder(interface())
            .handle("nope", |_, _| async { Ok::<_, CallError>(Value::Null) })
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownMethod { .. })));

        let result = Dispatcher::<Calculator>::builder(interface())
            .handle("describe", |_, _| async { Ok::<_, CallError>(Value::Null) })
            .build();
        assert!(matches!(result, Err(ConfigError::AmbiguousHandler { .. })));
    }

    #[test]
    fn build_rejects_non_remote_interface() {
        let interface = InterfaceDescriptor::builder("Local")
            .local_method("f", &[])
            .build();
        let result = Dispatcher::<Calculator>::builder(interface)
            .handle("f", |_, _| async { Ok::<_, CallError>(Value::Null) })
            .build();
        assert!(matches!(result, Err(ConfigError::NotRemote { .. })));
    }
}
