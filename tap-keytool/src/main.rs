//! tap-keytool - key management and signing CLI for TAP signatures
//!
//! Generates agent key pairs, signs and verifies individual requests from the
//! command line, and publishes public keys as a JWKS.
//!
//! ```text
//! tap-keytool keygen --algorithm ed25519 --out-dir keys --name agent
//! tap-keytool sign --key keys/agent.key.pem --method GET --url https://merchant.example.com/api/products
//! tap-keytool verify --public-key keys/agent.pub.pem --method GET \
//!     --url https://merchant.example.com/api/products \
//!     -H 'signature-input: sig1=...' -H 'signature: sig1=:...:'
//! tap-keytool jwk --public-key keys/agent.pub.pem
//! ```
//!
//! Logs go to stderr; filter with `RUST_LOG`, format with `LOG_FORMAT`.

#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from the RustCrypto stack"
)]

mod observability;

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, bail, ensure};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tap_signature::tap::{
    Algorithm, CONTENT_DIGEST_HEADER, Component, CoveredComponents, HttpRequest, Identity,
    InteractionType, PrivateKey, PublicKey, ReplayCache, SignedRequest, SignerConfig,
    SignerRegistry, SigningIdentity, TapSigner, TapVerifier, TrustRegistry, Validity,
    VerificationOutcome, VerifierConfig, VerifyingIdentity,
    jwk::{Jwk, Jwks},
    unix_now, verify_content_digest,
};
use tracing::info;
use zeroize::Zeroizing;

use crate::observability::{LogFormat, init_observability};

#[derive(Debug, Parser)]
#[command(name = "tap-keytool", version, about = "Trusted Agent Protocol key and signature tool")]
struct Cli {
    /// Log output format (`pretty` or `json`); defaults to `LOG_FORMAT`.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Log at debug level unless `RUST_LOG` is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a key pair as PKCS#8 / SPKI PEM files.
    Keygen(KeygenArgs),
    /// Sign a request and print the signature headers.
    Sign(SignArgs),
    /// Verify a signed request against a public key.
    Verify(VerifyArgs),
    /// Print a public key as a JWKS document.
    Jwk(JwkArgs),
}

#[derive(Debug, Args)]
struct KeygenArgs {
    /// Signature algorithm.
    #[arg(long, default_value = "ed25519")]
    algorithm: Algorithm,
    /// Directory for `<name>.key.pem` and `<name>.pub.pem`.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// File name stem.
    #[arg(long, default_value = "agent")]
    name: String,
    /// Overwrite existing files.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// HTTP method.
    #[arg(long, default_value = "GET")]
    method: String,
    /// Absolute URL or origin-form target (`/path?query`).
    #[arg(long)]
    url: String,
    /// Header field as `name: value`; repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,
    /// Request body file, covered through `Content-Digest`.
    #[arg(long)]
    body_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Interaction {
    Browse,
    Checkout,
}

impl From<Interaction> for InteractionType {
    fn from(value: Interaction) -> Self {
        match value {
            Interaction::Browse => Self::Browse,
            Interaction::Checkout => Self::Checkout,
        }
    }
}

#[derive(Debug, Args)]
struct SignArgs {
    #[command(flatten)]
    request: RequestArgs,
    /// PKCS#8 PEM private key.
    #[arg(long)]
    key: PathBuf,
    /// Key id; defaults to the key's JWK thumbprint.
    #[arg(long)]
    key_id: Option<String>,
    /// Covered component (`@method`, `@target-uri`, `@authority`, a header
    /// name, ...); repeatable. Defaults to `@method @target-uri`.
    #[arg(long = "component")]
    components: Vec<Component>,
    /// Interaction tag.
    #[arg(long)]
    tag: Option<Interaction>,
    /// Signature lifetime in seconds.
    #[arg(long, default_value_t = 300)]
    lifetime: u64,
    /// Signing time as Unix seconds; defaults to the system clock.
    #[arg(long)]
    now: Option<u64>,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[command(flatten)]
    request: RequestArgs,
    /// SPKI PEM public key.
    #[arg(long)]
    public_key: PathBuf,
    /// Key id the key is trusted under; defaults to its JWK thumbprint.
    #[arg(long)]
    key_id: Option<String>,
    /// Clock skew tolerance in seconds.
    #[arg(long, default_value_t = 0)]
    clock_skew: u64,
    /// Component the signature must cover; repeatable. Defaults to `@method`.
    #[arg(long = "require")]
    required: Vec<Component>,
    /// Verification time as Unix seconds; defaults to the system clock.
    #[arg(long)]
    now: Option<u64>,
    /// Print the full outcome as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct JwkArgs {
    /// SPKI PEM public key.
    #[arg(long)]
    public_key: PathBuf,
    /// `kid` to publish; defaults to the JWK thumbprint.
    #[arg(long)]
    key_id: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.log_format.unwrap_or_else(LogFormat::from_env);
    init_observability(format, if cli.verbose { "debug" } else { "warn" });

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Keygen(args) => {
            let summary = keygen(&args)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Sign(args) => {
            let signed = sign(&args)?;
            if let Some(digest) = signed.request().header(CONTENT_DIGEST_HEADER) {
                println!("{CONTENT_DIGEST_HEADER}: {digest}");
            }
            for (name, value) in signed.headers() {
                println!("{name}: {value}");
            }
        }
        Command::Verify(args) => {
            let outcome = verify(&args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.verdict.as_str());
            }
            if !outcome.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Jwk(args) => println!("{}", jwk(&args)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn keygen(args: &KeygenArgs) -> anyhow::Result<serde_json::Value> {
    let private_path = args.out_dir.join(format!("{}.key.pem", args.name));
    let public_path = args.out_dir.join(format!("{}.pub.pem", args.name));
    if !args.force {
        for path in [&private_path, &public_path] {
            ensure!(!path.exists(), "{} already exists (use --force)", path.display());
        }
    }

    let key = PrivateKey::generate(args.algorithm).context("key generation failed")?;
    let public_key = key.public_key();
    let key_id = Jwk::from_public_key(&public_key)?.thumbprint()?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;
    write_private_key(&private_path, &key.to_pkcs8_pem()?)?;
    fs::write(&public_path, public_key.to_public_key_pem()?)
        .with_context(|| format!("cannot write {}", public_path.display()))?;

    info!(algorithm = %args.algorithm, key_id, "key pair generated");
    Ok(serde_json::json!({
        "algorithm": args.algorithm.as_str(),
        "key_id": key_id,
        "private_key": private_path,
        "public_key": public_path,
    }))
}

fn write_private_key(path: &Path, pem: &str) -> anyhow::Result<()> {
    fs::write(path, pem).with_context(|| format!("cannot write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("cannot restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

fn sign(args: &SignArgs) -> anyhow::Result<SignedRequest> {
    let pem = Zeroizing::new(
        fs::read_to_string(&args.key)
            .with_context(|| format!("cannot read {}", args.key.display()))?,
    );
    let key = PrivateKey::from_pkcs8_pem(&pem).context("invalid private key")?;
    let identity = match &args.key_id {
        Some(key_id) => SigningIdentity::new(key_id.clone(), key, Validity::unbounded())?,
        None => SigningIdentity::with_thumbprint_key_id(key, Validity::unbounded())?,
    };
    let key_id = identity.key_id().to_owned();

    let registry = Arc::new(SignerRegistry::new());
    registry.register(identity)?;
    let config = SignerConfig {
        lifetime_secs: args.lifetime,
        tag: args.tag.map(InteractionType::from),
        ..SignerConfig::default()
    };
    let signer = TapSigner::new(registry, config).context("invalid signer settings")?;

    let request = build_request(&args.request)?;
    let mut components = if args.components.is_empty() {
        CoveredComponents::default()
    } else {
        CoveredComponents::new(args.components.clone())?
    };
    if request.header_values(CONTENT_DIGEST_HEADER).next().is_some() {
        components = components.with(Component::ContentDigest);
    }

    let now = match args.now {
        Some(now) => now,
        None => unix_now()?,
    };
    let signed = signer.sign(&request, &key_id, &components, now)?;
    info!(key_id, nonce = signed.nonce(), "request signed");
    Ok(signed)
}

fn verify(args: &VerifyArgs) -> anyhow::Result<VerificationOutcome> {
    let pem = fs::read_to_string(&args.public_key)
        .with_context(|| format!("cannot read {}", args.public_key.display()))?;
    let key = PublicKey::from_public_key_pem(&pem).context("invalid public key")?;
    let key_id = match &args.key_id {
        Some(key_id) => key_id.clone(),
        None => Jwk::from_public_key(&key)?.thumbprint()?,
    };

    let trust = Arc::new(TrustRegistry::new());
    trust.register(VerifyingIdentity::new(key_id, key, Validity::unbounded())?)?;
    let mut config = VerifierConfig { clock_skew_secs: args.clock_skew, ..VerifierConfig::default() };
    if !args.required.is_empty() {
        config.required_components.clone_from(&args.required);
    }
    let verifier = TapVerifier::new(trust, Arc::new(ReplayCache::new()), config)
        .context("invalid verifier settings")?;

    let request = parse_request(&args.request)?;
    if let Some(body_file) = &args.request.body_file {
        let body =
            fs::read(body_file).with_context(|| format!("cannot read {}", body_file.display()))?;
        let Some(digest) = request.header(CONTENT_DIGEST_HEADER) else {
            bail!("--body-file given but the request has no content-digest header");
        };
        ensure!(verify_content_digest(&digest, &body), "body does not match content-digest");
    }

    let now = match args.now {
        Some(now) => now,
        None => unix_now()?,
    };
    Ok(verifier.verify_detailed(&request, now))
}

fn jwk(args: &JwkArgs) -> anyhow::Result<String> {
    let pem = fs::read_to_string(&args.public_key)
        .with_context(|| format!("cannot read {}", args.public_key.display()))?;
    let key = PublicKey::from_public_key_pem(&pem).context("invalid public key")?;
    let mut jwk = Jwk::from_public_key(&key)?;
    if let Some(key_id) = &args.key_id {
        jwk.kid.clone_from(key_id);
    }
    Ok(Jwks::new(jwk).to_json()?)
}

/// Request as given on the command line; a body is turned into a
/// `Content-Digest` header.
fn build_request(args: &RequestArgs) -> anyhow::Result<HttpRequest> {
    let mut request = parse_request(args)?;
    if let Some(body_file) = &args.body_file {
        let body =
            fs::read(body_file).with_context(|| format!("cannot read {}", body_file.display()))?;
        request = request.with_content_digest(&body);
    }
    Ok(request)
}

fn parse_request(args: &RequestArgs) -> anyhow::Result<HttpRequest> {
    let mut request = HttpRequest::new(&args.method, &args.url)?;
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        request.append_header(name, value)?;
    }
    Ok(request)
}

fn parse_header(header: &str) -> anyhow::Result<(&str, &str)> {
    let Some((name, value)) = header.split_once(':') else {
        bail!("header `{header}` is not in `name: value` form");
    };
    Ok((name.trim(), value.trim()))
}
