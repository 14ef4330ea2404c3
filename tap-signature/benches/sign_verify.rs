//! Benchmark suite for signing and verification cost.
//!
//! Measures, per algorithm:
//! - Signature base construction
//! - Signature generation
//! - Full verification (including the replay commit)
//!
//! Run with: `cargo bench --bench sign_verify`

#![allow(clippy::let_underscore_must_use, reason = "Criterion benchmarks ignore results")]
#![allow(missing_docs, reason = "Benchmark functions are self-documenting")]

use std::{hint::black_box, sync::Arc};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tap_signature::tap::{
    Algorithm, Component, CoveredComponents, HttpRequest, PrivateKey, ReplayCache, SignerConfig,
    SignerRegistry, SigningIdentity, TapSigner, TapVerifier, TrustRegistry, Validity,
    VerificationVerdict, VerifierConfig, canonicalize,
};

const NOW: u64 = 1_700_000_000;

fn setup(algorithm: Algorithm) -> (TapSigner, TapVerifier) {
    let key = PrivateKey::generate(algorithm).expect("key generation");
    let identity =
        SigningIdentity::new("bench-agent", key, Validity::unbounded()).expect("identity");

    let trust = Arc::new(TrustRegistry::new());
    trust.register(identity.verifying_identity()).expect("trust registration");
    let signers = Arc::new(SignerRegistry::new());
    signers.register(identity).expect("signer registration");

    (
        TapSigner::new(signers, SignerConfig::default()).expect("signer"),
        TapVerifier::new(trust, Arc::new(ReplayCache::new()), VerifierConfig::default())
            .expect("verifier"),
    )
}

fn request() -> HttpRequest {
    HttpRequest::new("POST", "https://merchant.example.com/checkout?session=abc")
        .expect("request")
        .with_header("user-agent", "ShoppingAgent/1.0")
        .expect("header")
        .with_content_digest(b"{\"cart_id\":\"c-42\",\"intent\":\"purchase\"}")
}

fn components() -> CoveredComponents {
    CoveredComponents::new(vec![
        Component::Method,
        Component::TargetUri,
        Component::Authority,
        Component::ContentDigest,
        Component::header("user-agent").expect("header component"),
    ])
    .expect("components")
}

fn bench_canonicalize(c: &mut Criterion) {
    let (signer, _) = setup(Algorithm::Ed25519);
    let request = request();
    let signed = signer.sign(&request, "bench-agent", &components(), NOW).expect("sign");

    c.bench_function("canonicalize", |b| {
        b.iter(|| canonicalize(black_box(&request), black_box(signed.parameters())));
    });
}

fn bench_sign(c: &mut Criterion) {
    let mut group = c.benchmark_group("sign");
    let request = request();
    let components = components();

    for algorithm in Algorithm::ALL {
        let (signer, _) = setup(algorithm);
        group.bench_with_input(BenchmarkId::new("algorithm", algorithm), &algorithm, |b, _| {
            b.iter(|| {
                signer.sign(black_box(&request), "bench-agent", black_box(&components), NOW)
            });
        });
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    let request = request();
    let components = components();

    for algorithm in Algorithm::ALL {
        let (signer, verifier) = setup(algorithm);
        group.bench_with_input(BenchmarkId::new("algorithm", algorithm), &algorithm, |b, _| {
            b.iter_batched(
                || signer.sign(&request, "bench-agent", &components, NOW).expect("sign"),
                |signed| {
                    let verdict = verifier.verify(black_box(&signed), NOW);
                    assert_eq!(verdict, VerificationVerdict::Valid);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_canonicalize, bench_sign, bench_verify);
criterion_main!(benches);
