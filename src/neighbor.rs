use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Discriminator for the transport family a neighbor belongs to. A gateway
/// may run several transports side by side; each transport admits only the
/// neighbors of its own kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NeighborKind {
    Tcp,
}

/// A peer endpoint: host, listening port and the two permission flags.
///
/// `Neighbor` is a cheap clonable handle. Equality and hashing go through
/// the handle's identity, *not* its field values: two neighbors constructed
/// from the same host and port are distinct entries, while every clone of
/// one handle refers to the same entry. The transport's tables are keyed on
/// this identity.
#[derive(Clone)]
pub struct Neighbor {
    inner: Arc<NeighborInner>,
}

struct NeighborInner {
    kind: NeighborKind,
    host: String,
    port: u16,
    gateway_can_send_to: bool,
    gateway_can_receive_from: bool,
}

impl Neighbor {
    /// A TCP neighbor with both permissions granted.
    pub fn tcp(host: impl Into<String>, port: u16) -> Neighbor {
        Neighbor::tcp_with_permissions(host, port, true, true)
    }

    pub fn tcp_with_permissions(
        host: impl Into<String>,
        port: u16,
        gateway_can_send_to: bool,
        gateway_can_receive_from: bool,
    ) -> Neighbor {
        Neighbor {
            inner: Arc::new(NeighborInner {
                kind: NeighborKind::Tcp,
                host: host.into(),
                port,
                gateway_can_send_to,
                gateway_can_receive_from,
            }),
        }
    }

    pub fn kind(&self) -> NeighborKind {
        self.inner.kind
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// May the gateway send packets to this neighbor?
    pub fn gateway_can_send_to(&self) -> bool {
        self.inner.gateway_can_send_to
    }

    /// May the gateway accept packets from this neighbor?
    pub fn gateway_can_receive_from(&self) -> bool {
        self.inner.gateway_can_receive_from
    }

    /// Does this neighbor claim the given remote address? Case-sensitive
    /// string comparison against the configured host.
    pub fn match_addr(&self, addr: &str) -> bool {
        self.inner.host == addr
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
impl Eq for Neighbor {}

impl Hash for Neighbor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl Debug for Neighbor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.inner.host, self.inner.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_identity_equality() {
        let a = Neighbor::tcp("1.2.3.4", 100);
        let b = Neighbor::tcp("1.2.3.4", 100);

        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let mut set = rustc_hash::FxHashSet::default();
        set.insert(a.clone());
        assert!(set.contains(&a));
        assert!(!set.contains(&b));
    }

    #[rstest]
    #[case::equal("10.0.0.1", "10.0.0.1", true)]
    #[case::different("10.0.0.1", "10.0.0.2", false)]
    #[case::case_sensitive("somehost", "SomeHost", false)]
    #[case::no_substring("10.0.0.1", "10.0.0.10", false)]
    fn test_match_addr(#[case] host: &str, #[case] addr: &str, #[case] expected: bool) {
        assert_eq!(Neighbor::tcp(host, 4).match_addr(addr), expected);
    }

    #[test]
    fn test_permissions() {
        let n = Neighbor::tcp("a", 1);
        assert!(n.gateway_can_send_to());
        assert!(n.gateway_can_receive_from());

        let n = Neighbor::tcp_with_permissions("a", 1, false, true);
        assert!(!n.gateway_can_send_to());
        assert!(n.gateway_can_receive_from());

        let n = Neighbor::tcp_with_permissions("a", 1, true, false);
        assert!(n.gateway_can_send_to());
        assert!(!n.gateway_can_receive_from());
    }
}
