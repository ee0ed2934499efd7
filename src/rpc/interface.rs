//! Remote interface descriptors.
//!
//! A descriptor lists the methods a contract exposes. It is the only type
//! information the RPC layer has: listeners match invocations against it and
//! stubs carry it so that two stubs for different contracts never compare equal.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::value::{TypeTag, Value};

/// One method of a remote interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<TypeTag>,
    /// Whether the method can report an RPC failure to its caller.
    pub fallible: bool,
}

/// The set of method signatures a contract exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<MethodSignature>,
}

impl MethodSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Returns true if an invocation of `name` with `args` may call this method.
    pub fn matches(&self, name: &str, args: &[Value]) -> bool {
        self.name == name
            && self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(tag, arg)| tag.accepts(arg))
    }
}

impl InterfaceDescriptor {
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    /// Find the method an invocation resolves to.
    pub fn resolve(&self, name: &str, args: &[Value]) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.matches(name, args))
    }

    /// Check that every method is fallible and that name + arity is unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for method in &self.methods {
            if !method.fallible {
                return Err(ConfigError::NotRemote {
                    interface: self.name.clone(),
                    method: method.name.clone(),
                });
            }
            if !seen.insert((method.name.as_str(), method.arity())) {
                return Err(ConfigError::DuplicateMethod {
                    interface: self.name.clone(),
                    method: method.name.clone(),
                    arity: method.arity(),
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`InterfaceDescriptor`].
pub struct InterfaceBuilder {
    name: String,
    methods: Vec<MethodSignature>,
}

impl InterfaceBuilder {
    /// Declare a method that can report an RPC failure.
    pub fn method(mut self, name: impl Into<String>, params: &[TypeTag]) -> Self {
        self.methods.push(MethodSignature {
            name: name.into(),
            params: params.to_vec(),
            fallible: true,
        });
        self
    }

    /// Declare a method that has no way to report an RPC failure.
    ///
    /// Interfaces containing such a method fail validation.
    pub fn local_method(mut self, name: impl Into<String>, params: &[TypeTag]) -> Self {
        self.methods.push(MethodSignature {
            name: name.into(),
            params: params.to_vec(),
            fallible: false,
        });
        self
    }

    pub fn build(self) -> InterfaceDescriptor {
        InterfaceDescriptor {
            name: self.name,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> InterfaceDescriptor {
        InterfaceDescriptor::builder("Echo")
            .method("echo", &[TypeTag::Str])
            .method("echo", &[TypeTag::Str, TypeTag::Int])
            .method("ping", &[])
            .build()
    }

    #[test]
    fn valid_interface_passes() {
        assert!(echo().validate().is_ok());
    }

    #[test]
    fn one_local_method_disqualifies_the_interface() {
        let descriptor = InterfaceDescriptor::builder("Mixed")
            .method("ok", &[TypeTag::Int])
            .local_method("bad", &[])
            .build();

        assert_eq!(
            descriptor.validate(),
            Err(ConfigError::NotRemote {
                interface: "Mixed".into(),
                method: "bad".into(),
            })
        );
    }

    #[test]
    fn duplicate_name_and_arity_is_rejected() {
        let descriptor = InterfaceDescriptor::builder("Dup")
            .method("f", &[TypeTag::Int])
            .method("f", &[TypeTag::Str])
            .build();

        assert!(matches!(
            descriptor.validate(),
            Err(ConfigError::DuplicateMethod { arity: 1, .. })
        ));
    }

    #[test]
    fn resolve_uses_arity_and_tags() {
        let descriptor = echo();

        let one = descriptor.resolve("echo", &[Value::Str("hi".into())]).unwrap();
        assert_eq!(one.arity(), 1);

        let two = descriptor
            .resolve("echo", &[Value::Str("hi".into()), Value::Int(2)])
            .unwrap();
        assert_eq!(two.arity(), 2);

        assert!(descriptor.resolve("echo", &[Value::Int(1)]).is_none());
        assert!(descriptor.resolve("nope", &[]).is_none());
    }

    #[test]
    fn resolve_treats_null_as_wildcard() {
        let descriptor = echo();
        assert!(descriptor.resolve("echo", &[Value::Null]).is_some());
        assert!(descriptor.resolve("echo", &[Value::Null, Value::Null]).is_some());
    }
}
