use futures::executor::LocalPool;
use tally::{
    Counter, CounterId, Engine, LocalSessionProvider, MemoryStore, Session, SessionBinding,
    SessionProvider as _, StoreOp, SyncError, UserId, default_counters,
};

fn id(raw: &str) -> CounterId {
    CounterId::parse(raw).unwrap()
}

fn alice() -> UserId {
    UserId::parse("alice").unwrap()
}

fn setup() -> (LocalPool, MemoryStore, Engine<MemoryStore>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let pool = LocalPool::new();
    let store = MemoryStore::new();
    let engine = Engine::new(store.clone(), pool.spawner());
    (pool, store, engine)
}

#[test]
fn first_sign_in_seeds_the_store_with_defaults() {
    let (mut pool, store, engine) = setup();

    pool.run_until(engine.apply_session(Session::SignedIn(alice())));

    assert_eq!(store.documents(&alice()), default_counters());
    assert_eq!(engine.counters(), default_counters());
    assert_eq!(engine.session(), Session::SignedIn(alice()));
    assert_eq!(engine.pending_writes(), 0);
}

#[test]
fn existing_records_are_adopted_verbatim() {
    let (mut pool, store, engine) = setup();
    let remote = vec![
        Counter::new(id("b"), 3),
        Counter::new(id("a"), -1),
        Counter::new(id("7"), 0),
    ];
    store.seed(&alice(), remote.clone());

    pool.run_until(engine.apply_session(Session::SignedIn(alice())));

    assert_eq!(engine.counters(), remote);
    assert_eq!(store.operations(), vec![StoreOp::ListAll]);
    assert_eq!(engine.snapshot().items_in_use(), 1);
}

#[test]
fn failed_load_falls_back_to_defaults_without_writing() {
    let (mut pool, store, engine) = setup();
    store.seed(&alice(), [Counter::new(id("x"), 5)]);
    store.fail_next(SyncError::unavailable("unavailable", "offline"));

    pool.run_until(engine.apply_session(Session::SignedIn(alice())));

    assert_eq!(engine.counters(), default_counters());
    assert_eq!(store.operations(), vec![StoreOp::ListAll]);
    assert_eq!(store.documents(&alice()), vec![Counter::new(id("x"), 5)]);
    // still signed in, so later writes go out
    engine.increment(&id("1"));
    pool.run_until_stalled();
    assert_eq!(store.value(&alice(), &id("1")), Some(1));
}

#[test]
fn failing_to_seed_defaults_still_adopts_them_locally() {
    let (mut pool, store, engine) = setup();
    store.unsupported(StoreOp::CreateOrSetValue);

    pool.run_until(engine.apply_session(Session::SignedIn(alice())));

    assert_eq!(engine.counters(), default_counters());
    assert!(store.documents(&alice()).is_empty());
    let failure = engine.last_failure().unwrap();
    assert_eq!(failure.operation, StoreOp::CreateOrSetValue);
    assert_eq!(engine.pending_writes(), 0);
}

#[test]
fn sign_out_with_writes_in_flight_resets_immediately() {
    let (mut pool, store, engine) = setup();
    pool.run_until(engine.apply_session(Session::SignedIn(alice())));

    store.hold();
    engine.increment(&id("1"));
    engine.increment(&id("1"));
    engine.delete(&id("2"));
    pool.run_until_stalled();
    assert_eq!(engine.pending_writes(), 3);

    engine.switch_session(Session::SignedOut);
    assert_eq!(engine.counters(), default_counters());
    assert_eq!(engine.pending_writes(), 3);

    store.release_all();
    pool.run_until_stalled();

    assert_eq!(engine.pending_writes(), 0);
    assert_eq!(engine.counters(), default_counters());
    assert_eq!(store.value(&alice(), &id("1")), Some(2));
    assert_eq!(store.value(&alice(), &id("2")), None);
}

#[test]
fn a_load_that_finishes_after_sign_out_is_discarded() {
    let (mut pool, store, engine) = setup();
    store.seed(&alice(), [Counter::new(id("z"), 9)]);

    store.hold();
    engine.switch_session(Session::SignedIn(alice()));
    pool.run_until_stalled();
    assert_eq!(store.parked(), 1);

    engine.switch_session(Session::SignedOut);
    store.release_all();
    pool.run_until_stalled();

    assert_eq!(engine.session(), Session::SignedOut);
    assert_eq!(engine.counters(), default_counters());
}

#[test]
fn switching_users_reloads_from_the_new_partition() {
    let (mut pool, store, engine) = setup();
    let bob = UserId::parse("bob").unwrap();
    store.seed(&bob, [Counter::new(id("b1"), 4)]);

    pool.run_until(engine.apply_session(Session::SignedIn(alice())));
    engine.increment(&id("3"));
    pool.run_until(engine.apply_session(Session::SignedIn(bob.clone())));
    pool.run_until_stalled();

    assert_eq!(engine.counters(), vec![Counter::new(id("b1"), 4)]);
    assert_eq!(store.value(&alice(), &id("3")), Some(1));
    assert_eq!(store.value(&bob, &id("3")), None);
}

#[test]
fn binding_follows_the_provider() {
    let (mut pool, store, engine) = setup();
    let provider = LocalSessionProvider::new();
    let binding = SessionBinding::new(engine.clone(), provider.clone());

    let user = pool
        .run_until(binding.sign_in("alice".to_string()))
        .unwrap();
    pool.run_until_stalled();
    assert_eq!(user, alice());
    assert_eq!(engine.session(), Session::SignedIn(alice()));
    assert_eq!(store.documents(&alice()), default_counters());

    engine.increment(&id("4"));
    pool.run_until(binding.sign_out()).unwrap();
    assert_eq!(engine.session(), Session::SignedOut);
    assert_eq!(engine.counters(), default_counters());
    pool.run_until_stalled();
    assert_eq!(store.value(&alice(), &id("4")), Some(1));
}

#[test]
fn binding_records_auth_errors() {
    let (mut pool, _store, engine) = setup();
    let provider = LocalSessionProvider::new();
    let binding = SessionBinding::new(engine.clone(), provider.clone());

    provider.reject_next("popup closed by user");
    assert!(pool.run_until(binding.sign_in("alice".to_string())).is_err());
    let status = binding.auth_status();
    assert!(!status.busy);
    assert_eq!(
        status.error.as_deref(),
        Some("sign-in rejected: popup closed by user")
    );
    assert_eq!(engine.session(), Session::SignedOut);

    pool.run_until(binding.sign_in("alice".to_string())).unwrap();
    assert_eq!(binding.auth_status().error, None);
}

#[test]
fn dropping_the_binding_detaches_the_engine() {
    let (mut pool, _store, engine) = setup();
    let provider = LocalSessionProvider::new();
    let binding = SessionBinding::new(engine.clone(), provider.clone());
    drop(binding);

    pool.run_until(provider.sign_in("alice".to_string())).unwrap();
    pool.run_until_stalled();
    assert_eq!(engine.session(), Session::SignedOut);
}
