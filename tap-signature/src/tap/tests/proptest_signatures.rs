use std::sync::Arc;

use ed25519_dalek::SigningKey;
use proptest::prelude::*;

use crate::tap::{
    Component, CoveredComponents, HttpRequest, PrivateKey, ReplayCache, SIGNATURE_INPUT_HEADER,
    SignatureInput, SignerConfig, SignerRegistry, SigningIdentity, TapSigner, TapVerifier,
    TrustRegistry, Validity, VerificationVerdict, VerifierConfig,
};

const NOW: u64 = 1_700_000_000;

fn pair(seed: [u8; 32], key_id: &str) -> (TapSigner, TapVerifier) {
    let key = PrivateKey::Ed25519(SigningKey::from_bytes(&seed));
    let identity = SigningIdentity::new(key_id, key, Validity::unbounded()).unwrap();

    let trust = Arc::new(TrustRegistry::new());
    trust.register(identity.verifying_identity()).unwrap();
    let signers = Arc::new(SignerRegistry::new());
    signers.register(identity).unwrap();

    (
        TapSigner::new(signers, SignerConfig::default()).unwrap(),
        TapVerifier::new(trust, Arc::new(ReplayCache::new()), VerifierConfig::default()).unwrap(),
    )
}

fn components() -> CoveredComponents {
    CoveredComponents::new(vec![
        Component::Method,
        Component::TargetUri,
        Component::Authority,
        Component::header("x-agent-context").unwrap(),
    ])
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_signature_verification_roundtrip(
        seed in any::<[u8; 32]>(),
        key_id in "[a-zA-Z0-9_-]{1,64}",
        method in "GET|POST|PUT|DELETE",
        authority in "[a-z0-9]{1,20}\\.com",
        path in "/[a-z0-9/]{0,32}",
        query in proptest::option::of("[a-z0-9=&]{1,16}"),
        context in "[ -~]{0,48}",
        elapsed in 0u64..=300,
    ) {
        let (signer, verifier) = pair(seed, &key_id);
        let target = match &query {
            Some(q) => format!("https://{authority}{path}?{q}"),
            None => format!("https://{authority}{path}"),
        };
        let request = HttpRequest::new(&method, &target)
            .unwrap()
            .with_header("x-agent-context", &context)
            .unwrap();

        let signed = signer.sign(&request, &key_id, &components(), NOW).unwrap();

        prop_assert_eq!(verifier.verify(&signed, NOW + elapsed), VerificationVerdict::Valid);
        prop_assert_eq!(verifier.verify(&signed, NOW + elapsed), VerificationVerdict::Replayed);
    }

    #[test]
    fn test_covered_component_tampering_detected(
        seed in any::<[u8; 32]>(),
        path in "/[a-z]{1,16}",
        other_path in "/[a-z]{1,16}",
        context in "[a-z]{1,16}",
        other_context in "[a-z]{1,16}",
    ) {
        prop_assume!(path != other_path || context != other_context);
        let (signer, verifier) = pair(seed, "agent-key");

        let request = HttpRequest::new("POST", &format!("https://shop.example.com{path}"))
            .unwrap()
            .with_header("x-agent-context", &context)
            .unwrap();
        let signed = signer.sign(&request, "agent-key", &components(), NOW).unwrap();

        let mut tampered = HttpRequest::new("POST", &format!("https://shop.example.com{other_path}"))
            .unwrap()
            .with_header("x-agent-context", &other_context)
            .unwrap();
        for (name, value) in signed.headers() {
            tampered.insert_header(name, value).unwrap();
        }

        prop_assert_eq!(verifier.verify(&tampered, NOW + 1), VerificationVerdict::SignatureMismatch);
        prop_assert!(verifier.replay_cache().is_empty());
    }

    #[test]
    fn test_parameters_are_bound_to_signature(
        seed in any::<[u8; 32]>(),
        shift in 1u64..=100,
    ) {
        let (signer, verifier) = pair(seed, "agent-key");
        let request = HttpRequest::new("GET", "https://shop.example.com/api/products").unwrap();
        let signed = signer.sign(&request, "agent-key", &components_without_header(), NOW).unwrap();

        let input = signed.signature_input();
        let earlier_expiry = input.replace(
            &format!("expires={}", NOW + 300),
            &format!("expires={}", NOW + 300 - shift),
        );
        prop_assert_ne!(&earlier_expiry, input);

        let mut forged = signed.request().clone();
        forged.insert_header(SIGNATURE_INPUT_HEADER, &earlier_expiry).unwrap();
        prop_assert_eq!(verifier.verify(&forged, NOW), VerificationVerdict::SignatureMismatch);
        prop_assert_eq!(verifier.verify(&signed, NOW), VerificationVerdict::Valid);
    }

    #[test]
    fn test_signature_input_parses_back(
        seed in any::<[u8; 32]>(),
        created in 0u64..=999_999_999_999,
        lifetime in 1u64..=480,
    ) {
        let (signer, _) = pair(seed, "agent-key");
        let config = SignerConfig { lifetime_secs: lifetime, ..SignerConfig::default() };
        let signer = TapSigner::new(Arc::clone(signer.registry()), config).unwrap();
        let request = HttpRequest::new("GET", "https://shop.example.com/").unwrap();
        let signed = signer.sign(&request, "agent-key", &components_without_header(), created).unwrap();

        let parsed = SignatureInput::parse(signed.signature_input()).unwrap();
        prop_assert_eq!(parsed.created, created);
        prop_assert_eq!(parsed.expires, created + lifetime);
        prop_assert_eq!(parsed.nonce.as_str(), signed.nonce());
        prop_assert_eq!(parsed.key_id.as_str(), "agent-key");
    }
}

fn components_without_header() -> CoveredComponents {
    CoveredComponents::method_and_target()
}
