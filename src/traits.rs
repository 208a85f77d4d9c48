use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::MailConfig;
use crate::constants::SESSION_COOKIE;
use crate::error::AppError;

/// The chat page as first served: body plus the session cookie, if one was set.
#[derive(Debug, Clone)]
pub(crate) struct ChatPage {
    pub(crate) body: String,
    pub(crate) session_cookie: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ChatApi: Send + Sync {
    fn endpoint(&self) -> String;
    async fn fetch_page(&self) -> Result<ChatPage, AppError>;
    async fn load_chat(&self, cookie: &str) -> Result<(), AppError>;
    async fn handle_request(&self, cookie: &str, cmd: &str) -> Result<String, AppError>;
}

#[cfg_attr(test, mockall::automock)]
pub(crate) trait Mailer: Send + Sync {
    fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
    fn default_recipient(&self) -> Option<String>;
}

pub(crate) struct ChatApiImpl {
    pub(crate) http: Client,
    pub(crate) chat_url: String,
}

impl ChatApiImpl {
    pub(crate) fn new(chat_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            chat_url: chat_url.to_string(),
        })
    }
}

fn cookie_header(cookie: &str) -> String {
    format!("{SESSION_COOKIE}={cookie}")
}

pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            (name.trim() == SESSION_COOKIE && !value.trim().is_empty())
                .then(|| value.trim().to_string())
        })
}

#[async_trait]
impl ChatApi for ChatApiImpl {
    fn endpoint(&self) -> String {
        self.chat_url.clone()
    }

    async fn fetch_page(&self) -> Result<ChatPage, AppError> {
        let resp = self.http.get(&self.chat_url).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Chat(format!("Page fetch failed: {}", resp.status())));
        }
        let session_cookie = session_cookie(resp.headers());
        let body = resp.text().await?;
        debug!(body_len = body.len(), has_session = session_cookie.is_some(), "Fetched chat page");
        Ok(ChatPage {
            body,
            session_cookie,
        })
    }

    async fn load_chat(&self, cookie: &str) -> Result<(), AppError> {
        let resp = self
            .http
            .get(&self.chat_url)
            .query(&[("f", "loadChat"), ("pfc_ajax", "1")])
            .header(COOKIE, cookie_header(cookie))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Chat(format!("loadChat failed: {}", resp.status())));
        }
        Ok(())
    }

    async fn handle_request(&self, cookie: &str, cmd: &str) -> Result<String, AppError> {
        let form = [
            ("pfc_ajax", "1"),
            ("f", "handleRequest"),
            ("_", ""),
            ("cmd", cmd),
        ];
        let resp = self
            .http
            .post(&self.chat_url)
            .header(COOKIE, cookie_header(cookie))
            .form(&form)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Chat request failed");
            return Err(AppError::Chat(format!("Request failed: {status}")));
        }
        Ok(resp.text().await?)
    }
}

pub(crate) struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    mailing_list: Option<String>,
}

impl SmtpMailer {
    pub(crate) fn from_config(cfg: &MailConfig) -> Result<Self, AppError> {
        let from: Mailbox = cfg.from.parse()?;
        let mut builder = SmtpTransport::starttls_relay(&cfg.server)?.port(cfg.port);
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
            mailing_list: cfg.mailing_list.clone(),
        })
    }
}

impl Mailer for SmtpMailer {
    fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        let to: Mailbox = to.parse()?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        self.transport.send(&email)?;
        Ok(())
    }

    fn default_recipient(&self) -> Option<String> {
        self.mailing_list.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> ChatApiImpl {
        ChatApiImpl::new(&format!("{}/chat/index.php", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_page_reads_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/index.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "PHPSESSID=sess42; path=/")
                    .set_body_string("var pfc_clientid = \"abc\";"),
            )
            .mount(&server)
            .await;
        let page = api_for(&server).fetch_page().await.unwrap();
        assert_eq!(page.session_cookie.as_deref(), Some("sess42"));
        assert!(page.body.contains("pfc_clientid"));
    }

    #[tokio::test]
    async fn test_fetch_page_without_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/index.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;
        let page = api_for(&server).fetch_page().await.unwrap();
        assert!(page.session_cookie.is_none());
    }

    #[tokio::test]
    async fn test_fetch_page_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/index.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = api_for(&server).fetch_page().await.unwrap_err();
        assert!(matches!(err, AppError::Chat(_)));
    }

    #[tokio::test]
    async fn test_load_chat_sends_query_and_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/index.php"))
            .and(query_param("f", "loadChat"))
            .and(query_param("pfc_ajax", "1"))
            .and(header("cookie", "PHPSESSID=sess42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        assert!(api_for(&server).load_chat("sess42").await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_request_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/index.php"))
            .and(header("cookie", "PHPSESSID=sess42"))
            .and(body_string_contains("f=handleRequest"))
            .and(body_string_contains("pfc_ajax=1"))
            .and(body_string_contains("cmd=%2Fupdate+abc+room1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok-body"))
            .expect(1)
            .mount(&server)
            .await;
        let body = api_for(&server)
            .handle_request("sess42", "/update abc room1")
            .await
            .unwrap();
        assert_eq!(body, "ok-body");
    }

    #[tokio::test]
    async fn test_handle_request_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/index.php"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal error"))
            .mount(&server)
            .await;
        let err = api_for(&server)
            .handle_request("sess42", "/send abc room1 hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Chat(_)));
    }

    #[tokio::test]
    async fn test_handle_request_unreachable_is_http_error() {
        let api = ChatApiImpl::new("http://127.0.0.1:1/index.php", Duration::from_secs(2)).unwrap();
        let err = api.handle_request("s", "/update a b").await.unwrap_err();
        assert!(matches!(err, AppError::Http(_)));
    }

    #[test]
    fn test_session_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, "lang=es; path=/".parse().unwrap());
        headers.append(SET_COOKIE, "PHPSESSID=xyz; HttpOnly".parse().unwrap());
        assert_eq!(session_cookie(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_session_cookie_empty_value_ignored() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, "PHPSESSID=; path=/".parse().unwrap());
        assert!(session_cookie(&headers).is_none());
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_from() {
        let cfg = MailConfig {
            server: "smtp.example.org".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "not an address".to_string(),
            mailing_list: None,
        };
        assert!(matches!(SmtpMailer::from_config(&cfg), Err(AppError::Mail(_))));
    }

    #[test]
    fn test_smtp_mailer_default_recipient() {
        let cfg = MailConfig {
            server: "smtp.example.org".to_string(),
            port: 587,
            username: Some("bot".to_string()),
            password: Some("secret".to_string()),
            from: "Bot <bot@example.org>".to_string(),
            mailing_list: Some("list@example.org".to_string()),
        };
        let mailer = SmtpMailer::from_config(&cfg).unwrap();
        assert_eq!(mailer.default_recipient().as_deref(), Some("list@example.org"));
    }
}
