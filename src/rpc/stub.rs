//! Client stubs and the stub factory.
//!
//! A [`Stub`] is an immutable (interface, address) pair. Each remote call
//! opens one connection, performs one exchange and closes it. Equality,
//! hashing and formatting are structural and never touch the network.
//!
//! Contracts wrap a `Stub` with [`typed_stub!`] and implement their trait on
//! the wrapper, one `call` per method.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::client::Connection;
use super::error::{CallError, ConfigError, Error, RpcFailure, StateError};
use super::interface::InterfaceDescriptor;
use super::listener::Listener;
use super::protocol::Invocation;
use super::value::{FromValue, Value};

/// Host and port of one listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same port, different host.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self::new(host, self.port)
    }
}

impl From<SocketAddr> for Address {
    /// Wildcard addresses are not connectable from elsewhere, so they map to loopback.
    fn from(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Self::new(ip.to_string(), addr.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {:?}", s))?;
        let port = port
            .parse()
            .map_err(|e| format!("invalid port in {:?}: {}", s, e))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in {:?}", s));
        }
        Ok(Self::new(host, port))
    }
}

/// A client-side proxy for a remote interface at a fixed address.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StubParts", into = "StubParts")]
pub struct Stub {
    interface: InterfaceDescriptor,
    address: Address,
}

#[derive(Serialize, Deserialize)]
struct StubParts {
    interface: InterfaceDescriptor,
    address: Address,
}

impl Stub {
    /// Create a stub for the listener at `address`.
    pub fn new(interface: InterfaceDescriptor, address: Address) -> Result<Self, ConfigError> {
        interface.validate()?;
        if address.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        Ok(Self { interface, address })
    }

    /// Create a stub carrying the listener's currently assigned address.
    pub fn for_listener<T: Send + Sync + 'static>(
        interface: InterfaceDescriptor,
        listener: &Listener<T>,
    ) -> Result<Self, Error> {
        let addr = listener.address().ok_or(StateError::Unbound)?;
        Ok(Self::new(interface, Address::from(addr))?)
    }

    /// Like [`for_listener`](Self::for_listener), but with an externally
    /// routable `host` in place of the listener's own.
    pub fn for_listener_with_host<T: Send + Sync + 'static>(
        interface: InterfaceDescriptor,
        listener: &Listener<T>,
        host: &str,
    ) -> Result<Self, Error> {
        let addr = listener.address().ok_or(StateError::Unbound)?;
        Ok(Self::new(interface, Address::new(host, addr.port()))?)
    }

    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Call `method` on the remote object.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let mut connection = Connection::open(&self.address).await?;
        let result = connection.invoke(Invocation::new(method, args)).await;
        connection.close().await;
        result
    }

    /// Call `method` and decode the result.
    pub async fn call<R: FromValue>(&self, method: &str, args: Vec<Value>) -> Result<R, CallError> {
        let value = self.invoke(method, args).await?;
        R::from_value(value).map_err(|fault| RpcFailure::BadReply(fault).into())
    }
}

impl TryFrom<StubParts> for Stub {
    type Error = ConfigError;

    fn try_from(parts: StubParts) -> Result<Self, Self::Error> {
        Stub::new(parts.interface, parts.address)
    }
}

impl From<Stub> for StubParts {
    fn from(stub: Stub) -> Self {
        Self {
            interface: stub.interface,
            address: stub.address,
        }
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("interface", &self.interface.name())
            .field("address", &format_args!("{}", self.address))
            .finish()
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stub for {}", self.interface.name(), self.address)
    }
}

/// Declare a stub wrapper bound to one interface descriptor.
///
/// The wrapper only accepts stubs for that interface, so a `Command` stub
/// can never be passed where a `Storage` stub is expected.
macro_rules! typed_stub {
    ($(#[$meta:meta])* $vis:vis struct $name:ident => $interface:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis struct $name($crate::rpc::Stub);

        impl $name {
            pub fn new(address: $crate::rpc::Address) -> Result<Self, $crate::rpc::ConfigError> {
                $crate::rpc::Stub::new($interface.clone(), address).map(Self)
            }

            pub fn for_listener<T: Send + Sync + 'static>(
                listener: &$crate::rpc::Listener<T>,
            ) -> Result<Self, $crate::rpc::Error> {
                $crate::rpc::Stub::for_listener($interface.clone(), listener).map(Self)
            }

            pub fn for_listener_with_host<T: Send + Sync + 'static>(
                listener: &$crate::rpc::Listener<T>,
                host: &str,
            ) -> Result<Self, $crate::rpc::Error> {
                $crate::rpc::Stub::for_listener_with_host($interface.clone(), listener, host)
                    .map(Self)
            }

            pub fn stub(&self) -> &$crate::rpc::Stub {
                &self.0
            }

            pub fn address(&self) -> &$crate::rpc::Address {
                self.0.address()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl TryFrom<$crate::rpc::Stub> for $name {
            type Error = $crate::rpc::Fault;

            fn try_from(stub: $crate::rpc::Stub) -> Result<Self, Self::Error> {
                let expected = $interface;
                if stub.interface() != expected {
                    return Err($crate::rpc::Fault::invalid_argument(format!(
                        "expected a {} stub, got a {} stub",
                        expected.name(),
                        stub.interface().name()
                    )));
                }
                Ok(Self(stub))
            }
        }

        impl $crate::rpc::FromValue for $name {
            fn from_value(value: $crate::rpc::Value) -> Result<Self, $crate::rpc::Fault> {
                let stub = <$crate::rpc::Stub as $crate::rpc::FromValue>::from_value(value)?;
                Self::try_from(stub)
            }
        }

        impl From<$name> for $crate::rpc::Value {
            fn from(stub: $name) -> Self {
                $crate::rpc::Value::Stub(stub.0)
            }
        }

        impl From<&$name> for $crate::rpc::Value {
            fn from(stub: &$name) -> Self {
                $crate::rpc::Value::Stub(stub.0.clone())
            }
        }
    };
}

pub(crate) use typed_stub;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::value::TypeTag;
    use std::collections::HashSet;

    fn echo() -> InterfaceDescriptor {
        InterfaceDescriptor::builder("Echo")
            .method("echo", &[TypeTag::Str])
            .build()
    }

    fn other() -> InterfaceDescriptor {
        InterfaceDescriptor::builder("Other")
            .method("echo", &[TypeTag::Str])
            .build()
    }

    fn addr(port: u16) -> Address {
        Address::new("127.0.0.1", port)
    }

    #[test]
    fn equal_parts_make_equal_stubs() {
        let a = Stub::new(echo(), addr(7000)).unwrap();
        let b = Stub::new(echo(), addr(7000)).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn different_interface_or_address_differs() {
        let a = Stub::new(echo(), addr(7000)).unwrap();
        assert_ne!(a, Stub::new(echo(), addr(7001)).unwrap());
        assert_ne!(a, Stub::new(other(), addr(7000)).unwrap());
        assert_ne!(a, Stub::new(echo(), Address::new("localhost", 7000)).unwrap());
    }

    #[test]
    fn non_remote_interface_is_rejected() {
        let local = InterfaceDescriptor::builder("Local")
            .method("ok", &[])
            .local_method("bad", &[])
            .build();
        assert!(matches!(
            Stub::new(local, addr(1)),
            Err(ConfigError::NotRemote { .. })
        ));
    }

    #[test]
    fn empty_host_is_rejected() {
        assert_eq!(
            Stub::new(echo(), Address::new("", 1)),
            Err(ConfigError::EmptyHost)
        );
    }

    #[test]
    fn formatting_names_interface_and_address() {
        let stub = Stub::new(echo(), addr(7000)).unwrap();
        assert_eq!(stub.to_string(), "Echo stub for 127.0.0.1:7000");

        let debug = format!("{:?}", stub);
        assert!(debug.contains("Echo"));
        assert!(debug.contains("127.0.0.1:7000"));
    }

    #[test]
    fn deserialization_revalidates() {
        let stub = Stub::new(echo(), addr(7000)).unwrap();
        let json = serde_json::to_string(&stub).unwrap();
        let back: Stub = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stub);

        let tampered = json.replace(r#""fallible":true"#, r#""fallible":false"#);
        assert!(serde_json::from_str::<Stub>(&tampered).is_err());
    }

    #[test]
    fn wildcard_socket_addr_maps_to_loopback() {
        let address = Address::from("0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(address, addr(9000));

        let address = Address::from("[::]:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(address.host(), "::1");
        assert_eq!(address.to_string(), "[::1]:9000");
    }

    #[test]
    fn address_parses_host_and_port() {
        assert_eq!("example.org:80".parse::<Address>().unwrap(), Address::new("example.org", 80));
        assert_eq!("[::1]:80".parse::<Address>().unwrap(), Address::new("::1", 80));
        assert!("no-port".parse::<Address>().is_err());
        assert!(":80".parse::<Address>().is_err());
    }
}
