//! Benchmarks for session issuing and password hashing.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keygate_auth::kv::{KvSessionStore, MemoryKv};
use keygate_auth::{
    BcryptHasher, CredentialStore, MemoryCredentialStore, MemorySessionStore, NewUser,
    PasswordHasher, SessionController, UserId, generate_session_key,
};

fn bench_generate_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_session_key");
    for len in [16, 64, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| generate_session_key(black_box(len)))
        });
    }
    group.finish();
}

fn bench_bcrypt(c: &mut Criterion) {
    // lowest cost; measures overhead rather than the work factor
    let hasher = BcryptHasher::new(4);
    let hash = hasher.generate_hash(b"test_password_123").unwrap();

    c.bench_function("bcrypt_hash_cost4", |b| {
        b.iter(|| hasher.generate_hash(black_box(b"test_password_123")))
    });

    c.bench_function("bcrypt_check_correct", |b| {
        b.iter(|| hasher.check_password(black_box(hash.as_bytes()), black_box(b"test_password_123")))
    });

    c.bench_function("bcrypt_check_wrong", |b| {
        b.iter(|| hasher.check_password(black_box(hash.as_bytes()), black_box(b"wrong_password")))
    });
}

fn bench_memory_sessions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let controller = SessionController::new(MemorySessionStore::new());
    let (key, _) = rt
        .block_on(controller.issue(UserId(1), Duration::from_secs(3600)))
        .unwrap();

    let mut group = c.benchmark_group("memory_sessions");

    group.bench_function("issue", |b| {
        b.iter(|| rt.block_on(controller.issue(UserId(1), Duration::from_secs(3600))))
    });

    group.bench_function("validate_hit", |b| {
        b.iter(|| rt.block_on(controller.validate(black_box(&key))))
    });

    group.bench_function("validate_miss", |b| {
        b.iter(|| rt.block_on(controller.validate(black_box("missing"))))
    });

    group.finish();
}

fn bench_kv_sessions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    // the index maintainer is spawned on creation
    let controller = rt.block_on(async {
        SessionController::new(KvSessionStore::new(Arc::new(MemoryKv::new())))
    });
    let (key, _) = rt
        .block_on(controller.issue(UserId(1), Duration::from_secs(3600)))
        .unwrap();

    let mut group = c.benchmark_group("kv_sessions");

    group.bench_function("issue", |b| {
        b.iter(|| rt.block_on(controller.issue(UserId(2), Duration::from_secs(3600))))
    });

    group.bench_function("validate_hit", |b| {
        b.iter(|| rt.block_on(controller.validate(black_box(&key))))
    });

    group.finish();
}

fn bench_memory_credentials(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = MemoryCredentialStore::with_hasher(Arc::new(BcryptHasher::new(4)));
    for i in 0..100 {
        rt.block_on(store.insert(NewUser::named(&format!("user_{i}")), b"pw"))
            .unwrap();
    }

    let mut group = c.benchmark_group("memory_credentials");

    group.bench_function("validate_100_users", |b| {
        b.iter(|| rt.block_on(store.validate(black_box("user_50"), black_box(b"pw"))))
    });

    group.bench_function("list_users_100", |b| {
        b.iter(|| rt.block_on(store.list_users()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_generate_key,
    bench_bcrypt,
    bench_memory_sessions,
    bench_kv_sessions,
    bench_memory_credentials,
);

criterion_main!(benches);
