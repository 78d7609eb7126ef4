use std::{env, net::IpAddr};

use log::*;
use npg_common::helpers::parse_boolean_flag;
use novapay_engine::{
    helpers::{MerchantSecretKey, PlatformPublicKey},
    ProcessingPolicy,
    VerificationConfig,
};

const DEFAULT_NPG_HOST: &str = "127.0.0.1";
const DEFAULT_NPG_PORT: u16 = 8460;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The merchant number NovaPay assigned to this shop. Callbacks addressed to any other merchant are rejected.
    pub merchant_no: String,
    /// The platform's public key, used to verify inbound callback signatures. Without it, callbacks are rejected
    /// unless `allow_unverified_callbacks` is set.
    pub platform_public_key: Option<PlatformPublicKey>,
    /// The merchant private key. Signs outbound requests to the platform; it plays no part in verifying inbound
    /// callbacks and must never be confused with the platform key.
    pub merchant_secret_key: Option<MerchantSecretKey>,
    /// **DANGER** When true, callbacks are processed without signature verification if no platform public key is
    /// configured. Every such callback is recorded as "skipped" in the audit trail.
    pub allow_unverified_callbacks: bool,
    /// When true, callbacks for unknown orders are acknowledged with success so the platform stops retrying.
    pub ack_unknown_orders: bool,
    /// Maximum tolerated difference between the callback's paid amount and the stored order total, in minor
    /// currency units.
    pub reconciliation_tolerance: i64,
    /// When true, the audit trail includes Enter/Exit records for every pipeline component, not just decisions
    /// and errors.
    pub verbose_audit: bool,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// If supplied, requests against /novapay endpoints will be checked against a whitelist of platform IP
    /// addresses. To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub platform_whitelist: Option<Vec<IpAddr>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_NPG_HOST.to_string(),
            port: DEFAULT_NPG_PORT,
            database_url: String::default(),
            merchant_no: String::default(),
            platform_public_key: None,
            merchant_secret_key: None,
            allow_unverified_callbacks: false,
            ack_unknown_orders: false,
            reconciliation_tolerance: 0,
            verbose_audit: true,
            use_x_forwarded_for: false,
            use_forwarded: false,
            platform_whitelist: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("NPG_HOST").ok().unwrap_or_else(|| DEFAULT_NPG_HOST.into());
        let port = env::var("NPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for NPG_PORT. {e} Using the default, {DEFAULT_NPG_PORT}, instead."
                    );
                    DEFAULT_NPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_NPG_PORT);
        let database_url = env::var("NPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ NPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let merchant_no = env::var("NPG_MERCHANT_NO").ok().unwrap_or_else(|| {
            error!(
                "🪛️ NPG_MERCHANT_NO is not set. Please set it to the merchant number NovaPay assigned to this shop. \
                 Every callback will be rejected until it is configured."
            );
            String::default()
        });
        let platform_public_key = configure_platform_key();
        let merchant_secret_key = configure_merchant_key();
        let allow_unverified_callbacks =
            parse_boolean_flag(env::var("NPG_ALLOW_UNVERIFIED_CALLBACKS").ok(), false);
        if platform_public_key.is_none() {
            if allow_unverified_callbacks {
                warn!(
                    "🚨️🚨️🚨️ No platform public key is configured AND NPG_ALLOW_UNVERIFIED_CALLBACKS is set. \
                     Callbacks will be processed WITHOUT signature verification. Do not run production like this. \
                     🚨️🚨️🚨️"
                );
            } else {
                warn!(
                    "🚨️ No platform public key is configured. All callbacks will be rejected until \
                     NPG_PLATFORM_PUBLIC_KEY is set."
                );
            }
        }
        let ack_unknown_orders = parse_boolean_flag(env::var("NPG_ACK_UNKNOWN_ORDERS").ok(), false);
        let reconciliation_tolerance = env::var("NPG_RECONCILIATION_TOLERANCE")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for NPG_RECONCILIATION_TOLERANCE. {e}"))
                    .ok()
            })
            .unwrap_or(0);
        let verbose_audit = parse_boolean_flag(env::var("NPG_VERBOSE_AUDIT").ok(), true);
        let use_x_forwarded_for = parse_boolean_flag(env::var("NPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("NPG_USE_FORWARDED").ok(), false);
        let platform_whitelist = configure_whitelist();
        Self {
            host,
            port,
            database_url,
            merchant_no,
            platform_public_key,
            merchant_secret_key,
            allow_unverified_callbacks,
            ack_unknown_orders,
            reconciliation_tolerance,
            verbose_audit,
            use_x_forwarded_for,
            use_forwarded,
            platform_whitelist,
        }
    }

    pub fn verification_config(&self) -> VerificationConfig {
        VerificationConfig {
            merchant_no: self.merchant_no.clone(),
            platform_public_key: self.platform_public_key.clone(),
            allow_unverified: self.allow_unverified_callbacks,
        }
    }

    pub fn processing_policy(&self) -> ProcessingPolicy {
        ProcessingPolicy {
            ack_unknown_orders: self.ack_unknown_orders,
            reconciliation_tolerance: self.reconciliation_tolerance,
        }
    }
}

/// Key material can be pasted into the environment as PEM (with real or `\n`-escaped newlines, as dotenv files
/// usually carry it) or as the bare base64 DER body the NovaPay dashboard exports.
fn read_key_material(var: &str) -> Option<String> {
    env::var(var).ok().map(|s| s.replace("\\n", "\n")).filter(|s| !s.trim().is_empty())
}

fn configure_platform_key() -> Option<PlatformPublicKey> {
    let material = read_key_material("NPG_PLATFORM_PUBLIC_KEY")?;
    match PlatformPublicKey::from_pem(&material) {
        Ok(key) => Some(key),
        Err(e) => {
            error!("🪛️ NPG_PLATFORM_PUBLIC_KEY is set, but could not be parsed: {e}. Verification is UNAVAILABLE.");
            None
        },
    }
}

fn configure_merchant_key() -> Option<MerchantSecretKey> {
    let material = read_key_material("NPG_MERCHANT_SECRET_KEY");
    match material {
        None => {
            info!(
                "🪛️ NPG_MERCHANT_SECRET_KEY is not set. Inbound callbacks are unaffected, but outbound requests \
                 to the platform cannot be signed."
            );
            None
        },
        Some(material) => match MerchantSecretKey::from_pem(&material) {
            Ok(key) => Some(key),
            Err(e) => {
                error!("🪛️ NPG_MERCHANT_SECRET_KEY is set, but could not be parsed: {e}");
                None
            },
        },
    }
}

fn configure_whitelist() -> Option<Vec<IpAddr>> {
    let whitelist = env::var("NPG_PLATFORM_IP_WHITELIST").ok().and_then(|s| {
        if ["none", "false", "0"].contains(&s.to_lowercase().as_str()) {
            info!(
                "🪛️ Platform IP whitelist is disabled. If this is not what you want, set NPG_PLATFORM_IP_WHITELIST \
                 to a comma-separated list of IP addresses to enable it."
            );
            return None;
        }
        let ip_addrs = s
            .split(',')
            .filter_map(|s| {
                s.trim()
                    .parse()
                    .map_err(|e| {
                        warn!("🪛️ Ignoring invalid IP address ({s}) in NPG_PLATFORM_IP_WHITELIST: {e}");
                        None::<IpAddr>
                    })
                    .ok()
            })
            .collect::<Vec<IpAddr>>();
        Some(ip_addrs)
    });
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The platform IP whitelist was configured, but is empty. The server will run, but won't \
                 authorise any incoming callback requests."
            );
        },
        None => {
            info!("🪛️ No platform IP whitelist is set. Only signature validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Platform IP whitelist: {addrs}");
        },
    }
    whitelist
}
