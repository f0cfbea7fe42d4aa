use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    YouTube,
    Instagram,
    Facebook,
    TikTok,
    Twitch,
    #[serde(rename = "X/Twitter")]
    X,
}

#[derive(Debug)]
pub struct PlatformCapabilities {
    /// Quality/format selection is honoured by the backend.
    pub has_options: bool,
    /// The platform is browsed through a streamer archive search.
    pub has_search: bool,
    pub domains: &'static [&'static str],
}

static YOUTUBE: PlatformCapabilities = PlatformCapabilities {
    has_options: true,
    has_search: false,
    domains: &["youtube.com", "youtu.be"],
};

static INSTAGRAM: PlatformCapabilities = PlatformCapabilities {
    has_options: false,
    has_search: false,
    domains: &["instagram.com"],
};

static FACEBOOK: PlatformCapabilities = PlatformCapabilities {
    has_options: false,
    has_search: false,
    domains: &["facebook.com", "fb.watch"],
};

static TIKTOK: PlatformCapabilities = PlatformCapabilities {
    has_options: false,
    has_search: false,
    domains: &["tiktok.com"],
};

static TWITCH: PlatformCapabilities = PlatformCapabilities {
    has_options: false,
    has_search: true,
    domains: &["twitch.tv"],
};

static X: PlatformCapabilities = PlatformCapabilities {
    has_options: false,
    has_search: false,
    domains: &["x.com", "twitter.com"],
};

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::YouTube,
        Platform::Instagram,
        Platform::Facebook,
        Platform::TikTok,
        Platform::Twitch,
        Platform::X,
    ];

    pub fn capabilities(self) -> &'static PlatformCapabilities {
        match self {
            Platform::YouTube => &YOUTUBE,
            Platform::Instagram => &INSTAGRAM,
            Platform::Facebook => &FACEBOOK,
            Platform::TikTok => &TIKTOK,
            Platform::Twitch => &TWITCH,
            Platform::X => &X,
        }
    }

    /// Name the backend expects in request bodies.
    pub fn wire_name(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::TikTok => "TikTok",
            Platform::Twitch => "Twitch",
            Platform::X => "X/Twitter",
        }
    }

    /// Client-side hint only; the backend has the final word on validity.
    pub fn is_plausible_url(self, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }
        let parsed = if raw.contains("://") {
            Url::parse(raw)
        } else {
            Url::parse(&format!("https://{raw}"))
        };
        let url = match parsed {
            Ok(u) => u,
            Err(_) => return false,
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };
        self.capabilities()
            .domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }

    /// First platform whose domain table claims the URL.
    pub fn detect(raw: &str) -> Option<Platform> {
        Self::ALL.into_iter().find(|p| p.is_plausible_url(raw))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(Platform::YouTube),
            "instagram" | "ig" => Ok(Platform::Instagram),
            "facebook" | "fb" => Ok(Platform::Facebook),
            "tiktok" => Ok(Platform::TikTok),
            "twitch" => Ok(Platform::Twitch),
            "x" | "twitter" | "x/twitter" => Ok(Platform::X),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}
