use crate::promise::Promise;
use crate::SocketAddressResolver;
use std::net::{IpAddr, SocketAddr};

/// Resolver that answers IP address literals without dispatching to the
/// delegate.
///
/// Under load this keeps literal hosts off the delegate's executor, which may
/// be shared by many HTTP clients. Anything that is not a literal goes to the
/// delegate unchanged, and so does any failure it reports.
#[derive(Debug, Clone)]
pub struct LiteralShortcutResolver<R> {
    delegate: R,
}

impl<R> LiteralShortcutResolver<R> {
    pub fn new(delegate: R) -> Self {
        Self { delegate }
    }

    pub fn delegate(&self) -> &R {
        &self.delegate
    }
}

impl<R: SocketAddressResolver> SocketAddressResolver for LiteralShortcutResolver<R> {
    fn resolve(&self, host: &str, port: u16, promise: Promise) {
        match host.parse::<IpAddr>() {
            Ok(ip) => promise.succeeded(vec![SocketAddr::new(ip, port)]),
            // not an IP address literal
            Err(_) => self.delegate.resolve(host, port, promise),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::promise::ResolveResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Delegate that records calls and fails every lookup.
    #[derive(Default)]
    struct RecordingResolver {
        calls: AtomicUsize,
        hosts: Mutex<Vec<(String, u16)>>,
    }

    impl SocketAddressResolver for RecordingResolver {
        fn resolve(&self, host: &str, port: u16, promise: Promise) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hosts.lock().unwrap().push((host.to_owned(), port));
            promise.failed(ResolveError::NoAddresses {
                host: host.to_owned(),
            });
        }
    }

    fn shortcut() -> (LiteralShortcutResolver<Arc<RecordingResolver>>, Arc<RecordingResolver>) {
        let delegate = Arc::new(RecordingResolver::default());
        (LiteralShortcutResolver::new(Arc::clone(&delegate)), delegate)
    }

    /// Resolve and return the result only if it was delivered synchronously.
    fn resolve_now<R: SocketAddressResolver>(resolver: &R, host: &str, port: u16) -> Option<ResolveResult> {
        let slot = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        resolver.resolve(host, port, Promise::new(move |r| *s.lock().unwrap() = Some(r)));
        slot.lock().unwrap().take()
    }

    #[test]
    fn ipv4_literal_resolves_synchronously_without_delegate() {
        let (resolver, delegate) = shortcut();
        let result = resolve_now(&resolver, "192.168.1.20", 8080).expect("completed inline");
        assert_eq!(result.unwrap(), vec!["192.168.1.20:8080".parse::<SocketAddr>().unwrap()]);
        assert_eq!(delegate.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ipv6_literals_resolve_synchronously_without_delegate() {
        let (resolver, delegate) = shortcut();
        for host in ["::1", "2001:db8::8a2e:370:7334", "::ffff:10.0.0.1", "fe80::1"] {
            let result = resolve_now(&resolver, host, 443).expect("completed inline");
            let addrs = result.unwrap();
            assert_eq!(addrs.len(), 1, "{host}");
            assert_eq!(addrs[0].ip(), host.parse::<IpAddr>().unwrap());
            assert_eq!(addrs[0].port(), 443);
        }
        assert_eq!(delegate.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn port_zero_is_passed_through() {
        let (resolver, _delegate) = shortcut();
        let addrs = resolve_now(&resolver, "127.0.0.1", 0).unwrap().unwrap();
        assert_eq!(addrs[0].port(), 0);
    }

    #[test]
    fn hostnames_always_go_to_delegate() {
        let (resolver, delegate) = shortcut();
        for host in ["example.com", "localhost", "db-1.internal"] {
            resolve_now(&resolver, host, 80);
        }
        assert!(Arc::ptr_eq(resolver.delegate(), &delegate));
        assert_eq!(resolver.delegate().calls.load(Ordering::SeqCst), 3);
        assert_eq!(delegate.hosts.lock().unwrap()[1], ("localhost".to_string(), 80));
    }

    #[test]
    fn near_literals_are_not_swallowed() {
        let (resolver, delegate) = shortcut();
        for host in ["256.1.1.1", "10.0.0", "[::1]", "fe80::1%eth0", "", " 10.0.0.1"] {
            let result = resolve_now(&resolver, host, 80).expect("delegate completes inline");
            assert!(
                matches!(result, Err(ResolveError::NoAddresses { host: ref h }) if h == host),
                "{host:?} must surface the delegate failure"
            );
        }
        assert_eq!(delegate.calls.load(Ordering::SeqCst), 6);
    }
}
