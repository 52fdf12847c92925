//! Integration tests: LiteralShortcutResolver over the tokio AsyncResolver.
//!
//! These verify that:
//!
//! 1. Literals complete inline on the caller's thread.
//! 2. Hostnames are resolved asynchronously, after `resolve` returns.
//! 3. Delegate failures reach the caller unchanged.
//! 4. A promise whose runtime goes away reports `Cancelled`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strand_core::config::ResolverConfig;
use strand_resolver::{
    AsyncResolver, LiteralShortcutResolver, Promise, ResolveError, SocketAddressResolver, resolve,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn resolver(timeout: Duration) -> LiteralShortcutResolver<AsyncResolver> {
    LiteralShortcutResolver::new(AsyncResolver::new(
        tokio::runtime::Handle::current(),
        timeout,
    ))
}

// ── Literal shortcut ─────────────────────────────────────────────────────────

#[tokio::test]
async fn literal_completes_on_caller_thread() {
    let resolver = resolver(Duration::from_secs(1));
    let caller = std::thread::current().id();
    let seen = Arc::new(Mutex::new(None));
    let s = Arc::clone(&seen);
    resolver.resolve(
        "127.0.0.1",
        9080,
        Promise::new(move |result| {
            *s.lock().unwrap() = Some((std::thread::current().id(), result));
        }),
    );

    let (thread, result) = seen.lock().unwrap().take().expect("completed before return");
    assert_eq!(thread, caller);
    assert_eq!(
        result.unwrap(),
        vec!["127.0.0.1:9080".parse::<SocketAddr>().unwrap()]
    );
}

#[tokio::test]
async fn resolve_helper_returns_single_address_for_ipv6_literal() {
    let resolver = resolver(Duration::from_secs(1));
    let addrs = resolve(&resolver, "::1", 443).await.unwrap();
    assert_eq!(addrs, vec!["[::1]:443".parse::<SocketAddr>().unwrap()]);
}

// ── Delegated resolution ─────────────────────────────────────────────────────

#[tokio::test]
async fn hostname_is_completed_after_resolve_returns() {
    let resolver = resolver(Duration::from_secs(5));
    let done = Arc::new(AtomicBool::new(false));
    let (promise, rx) = Promise::channel();
    let d = Arc::clone(&done);
    let promise = Promise::new(move |result| {
        d.store(true, Ordering::SeqCst);
        promise.complete(result);
    });

    resolver.resolve("localhost", 8080, promise);
    // Current-thread runtime: the lookup task cannot have run yet.
    assert!(!done.load(Ordering::SeqCst));

    let addrs = rx.await.unwrap().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert!(!addrs.is_empty());
    assert!(addrs.iter().all(|a| a.port() == 8080 && a.ip().is_loopback()));
}

#[tokio::test]
async fn unresolvable_hostname_surfaces_delegate_failure() {
    let resolver = resolver(Duration::from_secs(2));
    let err = resolve(&resolver, "no-such-host.invalid", 80).await.unwrap_err();
    assert!(
        matches!(
            err,
            ResolveError::Lookup { .. } | ResolveError::Timeout { .. } | ResolveError::NoAddresses { .. }
        ),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("no-such-host.invalid"));
}

#[tokio::test]
async fn zero_timeout_does_not_affect_literals() {
    let resolver = resolver(Duration::ZERO);
    // A literal never reaches the delegate, so the timeout is irrelevant.
    assert!(resolve(&resolver, "10.1.2.3", 80).await.is_ok());
}

#[tokio::test]
async fn from_config_uses_configured_timeout() {
    let config = ResolverConfig { timeout_ms: 1234 };
    let delegate = AsyncResolver::from_config(tokio::runtime::Handle::current(), &config);
    assert_eq!(delegate.timeout(), Duration::from_millis(1234));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[test]
fn shut_down_runtime_cancels_pending_promise() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let resolver = AsyncResolver::new(runtime.handle().clone(), Duration::from_secs(5));

    let (tx, rx) = std::sync::mpsc::channel();
    resolver.resolve(
        "localhost",
        80,
        Promise::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    // The spawned task never ran; dropping the runtime drops its promise.
    drop(runtime);

    let result = rx.recv_timeout(Duration::from_secs(1)).expect("completed exactly once");
    assert!(matches!(result, Err(ResolveError::Cancelled)));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}
