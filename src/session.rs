use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::util::{self, FetchError, Fetcher, Request};

pub const LOGIN_URL: &str = "https://www.facebook.com/login.php?next=http%3A%2F%2Ffacebook.com%2Fhome.php&login_attempt=1";
pub const CHECKPOINT_URL: &str =
    "https://www.facebook.com/checkpoint/?next=http%3A%2F%2Ffacebook.com%2Fhome.php&_fb_noscript=1";

const ENV_EMAIL: &str = "FACEBOOK_EMAIL";
const ENV_PASSWORD: &str = "FACEBOOK_PASSWORD";

static RE_LSD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input type="hidden" name="lsd" value="([^"]*)""#).expect("valid lsd pattern")
});
static RE_LGNRND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="lgnrnd" value="([^"]*?)""#).expect("valid lgnrnd pattern")
});
static RE_LOGIN_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<form(.*)name="login"(.*)</form>"#).expect("valid login form pattern")
});
static RE_LOGIN_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<div[^>]+class=(?:"[^"]*login_error_box[^"]*"|'[^']*login_error_box[^']*')[^>]*><div[^>]*>.*?</div><div[^>]*>(?P<error>.+?)</div>"#,
    )
    .expect("valid login error pattern")
});
static RE_FB_DTSG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="fb_dtsg" value="(.+?)""#).expect("valid fb_dtsg pattern")
});
static RE_H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="h"\s+(?:\w+="[^"]+"\s+)*?value="([^"]+)""#).expect("valid h pattern")
});

const CHECKPOINT_SUBMIT_MARKER: &str = r#"id="checkpointSubmitButton""#;
const REJECTED_LOGIN_WARNING: &str = "unable to log in: bad username/password, or exceeded login rate limit (~3/min). Check credentials or wait.";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Reads `FACEBOOK_EMAIL` and `FACEBOOK_PASSWORD`. Both must be set and
    /// non-empty.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let email = lookup(ENV_EMAIL).filter(|e| !e.is_empty())?;
        let password = lookup(ENV_PASSWORD).filter(|p| !p.is_empty())?;
        Some(Self::new(email, password))
    }
}

/// Result of the single login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Ok,
    Anonymous,
    /// Facebook rejected the credentials and said why.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    Anonymous,
    LoginFailed(String),
}

/// Process-wide session. The cookies live in the fetcher's jar; this records
/// what the one login attempt achieved.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
        }
    }

    /// Runs the login flow at most once. Without credentials no request is
    /// made.
    pub async fn establish<F>(fetcher: &F, credentials: Option<&Credentials>) -> Self
    where
        F: Fetcher + ?Sized,
    {
        let Some(credentials) = credentials else {
            return Self::anonymous();
        };

        let state = match authenticate(fetcher, credentials).await {
            SessionOutcome::Ok => SessionState::Authenticated,
            SessionOutcome::Anonymous => SessionState::Anonymous,
            SessionOutcome::Error(reason) => {
                error!("Unable to login: {}", reason);
                SessionState::LoginFailed(reason)
            }
        };

        Self { state }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }
}

fn search<'a>(re: &Regex, haystack: &'a str) -> Option<&'a str> {
    re.captures(haystack)?.get(1).map(|m| m.as_str())
}

/// Logs in with `credentials`. Never fails: transport errors and unknown page
/// layouts leave the session anonymous.
pub async fn authenticate<F>(fetcher: &F, credentials: &Credentials) -> SessionOutcome
where
    F: Fetcher + ?Sized,
{
    match try_authenticate(fetcher, credentials).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("unable to log in: {}", e);
            SessionOutcome::Anonymous
        }
    }
}

async fn try_authenticate<F>(
    fetcher: &F,
    credentials: &Credentials,
) -> Result<SessionOutcome, FetchError>
where
    F: Fetcher + ?Sized,
{
    info!("Downloading login page");
    let login_page = fetcher
        .fetch(&Request::get(LOGIN_URL).cookie("locale", "en_US"))
        .await?;

    let (Some(lsd), Some(lgnrnd)) = (search(&RE_LSD, &login_page), search(&RE_LGNRND, &login_page))
    else {
        debug!("Login page has no lsd/lgnrnd tokens, continuing anonymously");
        return Ok(SessionOutcome::Anonymous);
    };

    let login_form = [
        ("email", credentials.email.as_str()),
        ("pass", credentials.password.as_str()),
        ("lsd", lsd),
        ("lgnrnd", lgnrnd),
        ("next", "http://facebook.com/home.php"),
        ("default_persistent", "0"),
        ("legacy_return", "1"),
        ("timezone", "-60"),
        ("trynum", "1"),
    ];
    info!("Logging in");
    let login_results = fetcher
        .fetch(&Request::post_form(LOGIN_URL, &login_form))
        .await?;

    if RE_LOGIN_FORM.is_match(&login_results) {
        let error = RE_LOGIN_ERROR
            .captures(&login_results)
            .and_then(|c| c.name("error"))
            .map(|m| util::clean_html(m.as_str()))
            .filter(|e| !e.is_empty());
        if let Some(error) = error {
            return Ok(SessionOutcome::Error(error));
        }

        warn!("{}", REJECTED_LOGIN_WARNING);
        return Ok(SessionOutcome::Anonymous);
    }

    let (Some(fb_dtsg), Some(h)) = (search(&RE_FB_DTSG, &login_results), search(&RE_H, &login_results))
    else {
        return Ok(SessionOutcome::Ok);
    };

    let check_form = [
        ("fb_dtsg", fb_dtsg),
        ("h", h),
        ("name_action_selected", "dont_save"),
    ];
    info!("Confirming login");
    let check_response = fetcher
        .fetch(&Request::post_form(CHECKPOINT_URL, &check_form))
        .await?;

    if check_response.contains(CHECKPOINT_SUBMIT_MARKER) {
        warn!("Unable to confirm login, you have to login in your browser and authorize the login.");
    }

    Ok(SessionOutcome::Ok)
}
