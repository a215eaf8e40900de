use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use thiserror::Error;

use super::decode::decode_bytes;
use super::Waveform;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("audio unavailable at {location}: {reason}")]
    Unavailable { location: String, reason: String },

    #[error("timed out fetching audio from {0}")]
    Timeout(String),

    #[error("could not decode audio: {0}")]
    Decode(String),
}

/// Where the bytes for an identifier live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioSource {
    Url(String),
    Path(PathBuf),
}

impl AudioSource {
    /// File extension used as a decoder hint, ignoring any query string.
    pub fn extension(&self) -> Option<String> {
        match self {
            AudioSource::Url(url) => {
                let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
                let last = path.rsplit('/').next()?;
                Path::new(last)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase)
            }
            AudioSource::Path(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase),
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Url(url) => f.write_str(url),
            AudioSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Maps an audio identifier to a retrievable source.
pub trait Resolver: Send + Sync {
    fn resolve(&self, id: &str) -> AudioSource;
}

/// Substitutes the identifier into a URL or path template containing `{id}`.
///
/// Templates starting with `http://` or `https://` resolve to URLs; anything
/// else (optionally prefixed with `file://`) resolves to a local path.
#[derive(Clone, Debug)]
pub struct TemplateResolver {
    template: String,
}

impl TemplateResolver {
    pub const PLACEHOLDER: &'static str = "{id}";

    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Resolver for TemplateResolver {
    fn resolve(&self, id: &str) -> AudioSource {
        let target = self.template.replace(Self::PLACEHOLDER, id);
        if target.starts_with("http://") || target.starts_with("https://") {
            AudioSource::Url(target)
        } else if let Some(path) = target.strip_prefix("file://") {
            AudioSource::Path(PathBuf::from(path))
        } else {
            AudioSource::Path(PathBuf::from(target))
        }
    }
}

/// Produces a 16 kHz mono waveform for an identifier.
pub trait WaveformFetcher: Send + Sync {
    fn fetch(&self, id: &str) -> Result<Waveform, FetchError>;
}

/// Fetches over HTTP (or from disk), decodes and resamples. No retries.
pub struct HttpFetcher {
    resolver: Box<dyn Resolver>,
    client: Client,
}

impl HttpFetcher {
    pub fn new(resolver: Box<dyn Resolver>, client: Client) -> Self {
        Self { resolver, client }
    }

    fn read_source(&self, source: &AudioSource) -> Result<Vec<u8>, FetchError> {
        match source {
            AudioSource::Url(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .map_err(|e| request_error(url, e))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Unavailable {
                        location: url.clone(),
                        reason: format!("HTTP {status}"),
                    });
                }
                let bytes = response.bytes().map_err(|e| request_error(url, e))?;
                Ok(bytes.to_vec())
            }
            AudioSource::Path(path) => {
                std::fs::read(path).map_err(|e| FetchError::Unavailable {
                    location: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl WaveformFetcher for HttpFetcher {
    fn fetch(&self, id: &str) -> Result<Waveform, FetchError> {
        let source = self.resolver.resolve(id);
        log::info!("Fetching audio '{}' from {}", id, source);

        let bytes = self.read_source(&source)?;
        let extension = source.extension();
        let audio = decode_bytes(bytes, extension.as_deref())?;
        let waveform = Waveform::from_audio(audio)?;

        log::info!("Audio '{}': {:.1}s at 16kHz", id, waveform.duration_secs());
        Ok(waveform)
    }
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else {
        FetchError::Unavailable {
            location: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Blocking HTTP client shared by the audio fetcher and the feature store.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tunematch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}


#[cfg(test)]
mod tests {
    use super::testing::{http_response, serve_once};
    use super::*;
    use crate::audio::decode::wav_bytes;
    use crate::audio::SAMPLE_RATE;

    fn tone_frames(n: usize) -> Vec<i16> {
        (0..n).map(|i| ((i as f32 * 0.1).sin() * 8000.0) as i16).collect()
    }

    fn url_fetcher(base: &str, timeout: Duration) -> HttpFetcher {
        let client = Client::builder().timeout(timeout).no_proxy().build().unwrap();
        let template = format!("{base}/audio/{{id}}.wav");
        HttpFetcher::new(Box::new(TemplateResolver::new(template)), client)
    }

    #[test]
    fn template_resolves_urls() {
        let resolver = TemplateResolver::new("https://bucket.example.com/songs/{id}.mp3");
        assert_eq!(
            resolver.resolve("blinding-lights"),
            AudioSource::Url("https://bucket.example.com/songs/blinding-lights.mp3".into())
        );
    }

    #[test]
    fn template_resolves_paths() {
        let resolver = TemplateResolver::new("file:///srv/audio/{id}.wav");
        assert_eq!(
            resolver.resolve("abc"),
            AudioSource::Path(PathBuf::from("/srv/audio/abc.wav"))
        );
        let resolver = TemplateResolver::new("downloads/{id}.m4a");
        assert_eq!(
            resolver.resolve("abc"),
            AudioSource::Path(PathBuf::from("downloads/abc.m4a"))
        );
    }

    #[test]
    fn extension_ignores_query_string() {
        let source = AudioSource::Url("https://cdn.example.com/a/song.MP3?sig=x.y".into());
        assert_eq!(source.extension().as_deref(), Some("mp3"));
        let source = AudioSource::Url("https://cdn.example.com/a/song".into());
        assert_eq!(source.extension(), None);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("missing-{id}.wav").display().to_string();
        let client = build_client(Duration::from_secs(1)).unwrap();
        let fetcher = HttpFetcher::new(Box::new(TemplateResolver::new(template)), client);
        let err = fetcher.fetch("nope").unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { .. }));
    }

    #[test]
    fn local_wav_is_resampled_to_16k() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_bytes(&tone_frames(8000), 8000, 1);
        std::fs::write(dir.path().join("tone.wav"), wav).unwrap();

        let client = build_client(Duration::from_secs(1)).unwrap();
        let template = dir.path().join("{id}.wav").display().to_string();
        let fetcher = HttpFetcher::new(Box::new(TemplateResolver::new(template)), client);
        let waveform = fetcher.fetch("tone").unwrap();

        assert_eq!(waveform.len(), SAMPLE_RATE as usize);
    }

    #[test]
    fn http_wav_is_fetched_and_resampled() {
        let body = wav_bytes(&tone_frames(4000), 8000, 1);
        let (base, server) = serve_once(http_response("200 OK", "audio/wav", &body), None);
        let waveform = url_fetcher(&base, Duration::from_secs(5)).fetch("tone").unwrap();

        assert_eq!(waveform.len(), SAMPLE_RATE as usize / 2);
        let head = server.join().unwrap();
        assert!(head.starts_with("GET /audio/tone.wav "), "request was {head:?}");
    }

    #[test]
    fn http_error_status_is_unavailable() {
        let (base, server) = serve_once(http_response("404 Not Found", "text/plain", b""), None);
        let err = url_fetcher(&base, Duration::from_secs(5)).fetch("gone").unwrap_err();
        server.join().unwrap();

        match err {
            FetchError::Unavailable { location, reason } => {
                assert!(location.ends_with("/audio/gone.wav"), "{location}");
                assert!(reason.contains("404"), "{reason}");
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn stalled_server_times_out() {
        let body = wav_bytes(&tone_frames(800), 8000, 1);
        let (base, _server) = serve_once(
            http_response("200 OK", "audio/wav", &body),
            Some(Duration::from_secs(2)),
        );
        let err = url_fetcher(&base, Duration::from_millis(100)).fetch("slow").unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {err:?}");
    }

    #[test]
    fn undecodable_body_is_a_decode_error() {
        let (base, _server) = serve_once(
            http_response("200 OK", "audio/wav", b"definitely not audio"),
            None,
        );
        let err = url_fetcher(&base, Duration::from_secs(5)).fetch("junk").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "got {err:?}");
    }
}
