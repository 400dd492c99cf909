use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, StatusCode, Url};
use reqwest_cookie_store::CookieStoreMutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use scraper::{Html, Selector};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// A single page request. A request with a form body is sent as an
/// url-encoded POST, everything else as a GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub user_agent: Option<String>,
    pub form: Option<Vec<(String, String)>>,
    pub cookies: Vec<(String, String)>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: None,
            form: None,
            cookies: Vec::new(),
        }
    }

    pub fn post_form(url: impl Into<String>, form: &[(&str, &str)]) -> Self {
        Self {
            form: Some(
                form.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Self::get(url)
        }
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_post(&self) -> bool {
        self.form.is_some()
    }
}

/// Retrieves raw documents. Every request made through one fetcher shares the
/// same cookie jar, which is what carries an authenticated session.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<String, FetchError>;
}

pub struct HttpClient {
    pub client: ClientWithMiddleware,
    pub cookies: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new() -> reqwest::Result<HttpClient> {
        let cookies = Arc::new(CookieStoreMutex::default());
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(HttpClient { client, cookies })
    }

    fn set_cookies(&self, url: &Url, cookies: &[(String, String)]) {
        if cookies.is_empty() {
            return;
        }

        let mut store = match self.cookies.lock() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (name, value) in cookies {
            if let Err(e) = store.parse(&format!("{}={}; Path=/", name, value), url) {
                warn!("Could not set cookie {}: {}", name, e);
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, request: &Request) -> Result<String, FetchError> {
        let url =
            Url::parse(&request.url).map_err(|_| FetchError::InvalidUrl(request.url.clone()))?;
        self.set_cookies(&url, &request.cookies);

        let mut builder = match &request.form {
            Some(form) => self.client.post(url).form(form),
            None => self.client.get(url),
        };
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(header::USER_AGENT, user_agent.as_str());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status,
            });
        }

        resp.text().await.map_err(|e| e.into())
    }
}

/// Percent-decodes `s`. Invalid UTF-8 sequences are replaced rather than
/// rejected.
pub fn unquote(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

pub fn unquote_plus(s: &str) -> String {
    unquote(&s.replace('+', " "))
}

static RE_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*").expect("valid newline pattern"));
static RE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*br\s*/?\s*>").expect("valid break pattern"));
static RE_PARAGRAPHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*/\s*p\s*>\s*<\s*p[^>]*>").expect("valid paragraph pattern")
});

/// Strips markup from an HTML fragment, decoding entities and keeping line
/// breaks that were expressed as `<br>` or paragraph boundaries.
pub fn clean_html(html: &str) -> String {
    let html = RE_NEWLINES.replace_all(html, " ");
    let html = RE_BREAKS.replace_all(&html, "\n");
    let html = RE_PARAGRAPHS.replace_all(&html, "\n");

    let fragment = Html::parse_fragment(&html);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

pub fn get_element_by_id(id: &str, html: &str) -> Option<String> {
    let selector = Selector::parse(&format!("#{}", id)).ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;
    Some(element.inner_html())
}

pub fn limit_length(s: &str, length: usize) -> String {
    const ELLIPSES: &str = "...";

    if s.chars().count() <= length {
        return s.to_string();
    }

    let mut truncated: String = s
        .chars()
        .take(length.saturating_sub(ELLIPSES.len()))
        .collect();
    truncated.push_str(ELLIPSES);
    truncated
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    enum Route {
        Body(String),
        Status(StatusCode),
    }

    pub struct MockFetcher {
        routes: Vec<(bool, String, Route)>,
        requests: Mutex<Vec<Request>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self {
                routes: Vec::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn get(mut self, url_prefix: &str, body: &str) -> Self {
            self.routes
                .push((false, url_prefix.into(), Route::Body(body.into())));
            self
        }

        pub fn post(mut self, url_prefix: &str, body: &str) -> Self {
            self.routes
                .push((true, url_prefix.into(), Route::Body(body.into())));
            self
        }

        pub fn fail(mut self, is_post: bool, url_prefix: &str, status: StatusCode) -> Self {
            self.routes
                .push((is_post, url_prefix.into(), Route::Status(status)));
            self
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &Request) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(request.clone());

            let route = self
                .routes
                .iter()
                .find(|(is_post, prefix, _)| {
                    *is_post == request.is_post() && request.url.starts_with(prefix.as_str())
                })
                .map(|(_, _, route)| route);

            match route {
                Some(Route::Body(body)) => Ok(body.clone()),
                Some(Route::Status(status)) => Err(FetchError::Status {
                    url: request.url.clone(),
                    status: *status,
                }),
                None => Err(FetchError::Status {
                    url: request.url.clone(),
                    status: StatusCode::NOT_FOUND,
                }),
            }
        }
    }

    pub fn get_test_html(fname: &str) -> String {
        let mut d = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/test/");
        d.push(fname);
        std::fs::read_to_string(d).expect(format!("Could not read {}", fname).as_str())
    }
}
