//! The single status comment on a pull request.
//!
//! No comment id survives between phases, so every phase re-discovers the
//! comment through a [`MessageLocator`]. The default [`MarkerLocator`] picks
//! the first comment authored by the bot account whose body carries
//! [`MARKER`]. Each update replaces the whole body.

use crate::config::GithubSettings;
use crate::error::{DeployError, Result};
use crate::redact::redact;
use crate::types::{Comment, Diff};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

/// Discovery key embedded in every status comment body.
pub const MARKER_ID: &str = "PLANETSCALE_PRISMA_GITHUB_ACTION_COMMENT";
pub const MARKER: &str = "<!-- PLANETSCALE_PRISMA_GITHUB_ACTION_COMMENT -->";

/// Present only in the body of a failure report.
const FAILURE_TAG: &str = "<!-- branchdeploy:failed -->";

const HEADER: &str = "<h4>PlanetScale deploy request</h4>";
const FOOTER: &str = "\n<br>\n<sub>Maintained by branchdeploy; updated on every pipeline run.</sub>\n";
const CONSOLE_URL: &str = "https://app.planetscale.com";

// ---------------------------------------------------------------------------
// Comment API
// ---------------------------------------------------------------------------

pub trait CommentsApi {
    fn list_comments(&self, issue: u64) -> Result<Vec<Comment>>;
    fn create_comment(&self, issue: u64, body: &str) -> Result<Comment>;
    fn update_comment(&self, id: u64, body: &str) -> Result<Comment>;
}

const PAGE_SIZE: usize = 100;

/// Issue comments over the GitHub REST API.
pub struct GithubComments {
    http: reqwest::blocking::Client,
    api_url: String,
    repository: String,
    token: String,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

impl GithubComments {
    pub fn new(settings: &GithubSettings) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DeployError::CommentApi {
                status: None,
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            repository: settings.repository.clone(),
            token: settings.token.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::blocking::RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "branchdeploy")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(&self.token)
    }

    fn send<T: for<'de> Deserialize<'de>>(&self, builder: reqwest::blocking::RequestBuilder) -> Result<T> {
        let response = builder.send().map_err(|e| DeployError::CommentApi {
            status: None,
            message: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(DeployError::CommentApi {
                status: Some(status.as_u16()),
                message,
            });
        }
        response.json().map_err(|e| DeployError::CommentApi {
            status: Some(status.as_u16()),
            message: format!("invalid response body: {e}"),
        })
    }
}

impl CommentsApi for GithubComments {
    fn list_comments(&self, issue: u64) -> Result<Vec<Comment>> {
        let url = format!("{}/repos/{}/issues/{issue}/comments", self.api_url, self.repository);
        let mut all = Vec::new();
        for page in 1.. {
            let batch: Vec<Comment> = self.send(
                self.request(reqwest::Method::GET, url.clone())
                    .query(&[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())]),
            )?;
            let done = batch.len() < PAGE_SIZE;
            all.extend(batch);
            if done {
                break;
            }
        }
        tracing::debug!(issue, count = all.len(), "listed existing comments");
        Ok(all)
    }

    fn create_comment(&self, issue: u64, body: &str) -> Result<Comment> {
        let url = format!("{}/repos/{}/issues/{issue}/comments", self.api_url, self.repository);
        self.send(self.request(reqwest::Method::POST, url).json(&CommentBody { body }))
    }

    fn update_comment(&self, id: u64, body: &str) -> Result<Comment> {
        let url = format!("{}/repos/{}/issues/comments/{id}", self.api_url, self.repository);
        self.send(self.request(reqwest::Method::PATCH, url).json(&CommentBody { body }))
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

pub trait MessageLocator {
    fn locate<'a>(&self, comments: &'a [Comment]) -> Option<&'a Comment>;
}

/// Matches `author login == bot_login` and `body contains MARKER_ID`.
#[derive(Debug, Clone)]
pub struct MarkerLocator {
    pub bot_login: String,
}

impl MessageLocator for MarkerLocator {
    fn locate<'a>(&self, comments: &'a [Comment]) -> Option<&'a Comment> {
        comments.iter().find(|c| {
            c.user.as_ref().is_some_and(|u| u.login == self.bot_login)
                && c.body.as_deref().is_some_and(|b| b.contains(MARKER_ID))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub id: u64,
    pub body: String,
}

impl StatusMessage {
    /// Whether the last render was a failure report.
    pub fn shows_failure(&self) -> bool {
        self.body.contains(FAILURE_TAG)
    }
}

impl From<Comment> for StatusMessage {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            body: c.body.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Console links for a deploy request and its branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequestLink {
    pub number: u64,
    pub branch: String,
    pub org: String,
    pub database: String,
}

impl DeployRequestLink {
    pub fn request_url(&self) -> String {
        format!(
            "{CONSOLE_URL}/{}/{}/deploy-requests/{}",
            self.org, self.database, self.number
        )
    }

    pub fn branch_url(&self) -> String {
        format!("{CONSOLE_URL}/{}/{}/{}", self.org, self.database, self.branch)
    }

    fn html(&self) -> String {
        format!(
            "<a href='{}'>Deploy request #{}</a> for \
             <a href=\"{}\"><code>{}</code></a> database branch",
            self.request_url(),
            self.number,
            self.branch_url(),
            self.branch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    Working(String),
    AwaitingApproval { link: DeployRequestLink, diffs: Vec<Diff> },
    Approved { link: DeployRequestLink, diffs: Vec<Diff> },
    Merging { link: DeployRequestLink },
    Merged { link: DeployRequestLink },
    Closed { link: DeployRequestLink },
    Failed { error: String },
}

fn render_diffs(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .map(|d| {
            let newline = if d.raw.ends_with('\n') { "" } else { "\n" };
            format!(
                "<details><summary>Schema changes ({})</summary>\n\n\n```diff\n{}{newline}```\n\n\n</details>",
                d.name, d.raw
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl StatusView {
    pub fn content(&self) -> String {
        match self {
            StatusView::Working(message) => format!("<p>{message}</p>"),
            StatusView::AwaitingApproval { link, diffs } => format!(
                "<p>Waiting for {} to be approved by a PlanetScale admin</p>{}",
                link.html(),
                render_diffs(diffs)
            ),
            StatusView::Approved { link, diffs } => {
                format!("<p>{}<b> was approved</b></p>{}", link.html(), render_diffs(diffs))
            }
            StatusView::Merging { link } => {
                format!("<p>Deploying {} into the main branch...</p>", link.html())
            }
            StatusView::Merged { link } => format!(
                "<p>{} <b>was deployed</b> and the database branch was deleted</p>",
                link.html()
            ),
            StatusView::Closed { link } => format!(
                "<p>{} was closed because the pull request was closed without merging</p>",
                link.html()
            ),
            StatusView::Failed { error } => {
                format!("{FAILURE_TAG}<p>Failed to run the automation</p><pre>{error}</pre>")
            }
        }
    }
}

/// Header + redacted content + footer + marker.
pub fn render_body(content: &str, secret: &str) -> String {
    format!("{HEADER}{}{FOOTER}{MARKER}\n", redact(content, secret))
}

// ---------------------------------------------------------------------------
// StatusReporter
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StatusReporter {
    api: Rc<dyn CommentsApi>,
    locator: Rc<dyn MessageLocator>,
    issue: u64,
    secret: String,
}

impl StatusReporter {
    pub fn new(
        api: Rc<dyn CommentsApi>,
        locator: Rc<dyn MessageLocator>,
        issue: u64,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            api,
            locator,
            issue,
            secret: secret.into(),
        }
    }

    pub fn issue(&self) -> u64 {
        self.issue
    }

    pub fn render(&self, view: &StatusView) -> String {
        render_body(&view.content(), &self.secret)
    }

    /// The existing status comment, if any.
    pub fn current(&self) -> Result<Option<StatusMessage>> {
        let comments = self.api.list_comments(self.issue)?;
        Ok(self.locator.locate(&comments).cloned().map(StatusMessage::from))
    }

    /// Re-discover the status comment, creating it if none matches.
    pub fn find_or_create(&self) -> Result<StatusMessage> {
        if let Some(existing) = self.current()? {
            return Ok(existing);
        }
        tracing::info!(issue = self.issue, "no existing status comment found, creating one");
        let body = self.render(&StatusView::Working(
            "Creating a new deploy request for this branch...".to_string(),
        ));
        Ok(self.api.create_comment(self.issue, &body)?.into())
    }

    /// Replace the body of `message` wholesale.
    pub fn update(&self, message: &StatusMessage, body: &str) -> Result<StatusMessage> {
        Ok(self.api.update_comment(message.id, body)?.into())
    }

    pub fn report(&self, view: &StatusView) -> Result<StatusMessage> {
        let message = self.find_or_create()?;
        self.update(&message, &self.render(view))
    }

    /// Best effort: a failure to report a failure is logged, not raised.
    pub fn report_failure(&self, error: &str) {
        let view = StatusView::Failed {
            error: error.to_string(),
        };
        if let Err(e) = self.report(&view) {
            tracing::warn!(issue = self.issue, error = %e, "could not update status comment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::REDACTED;
    use crate::testing::{FakeComments, BOT, SECRET};

    fn reporter(api: &Rc<FakeComments>) -> StatusReporter {
        StatusReporter::new(
            api.clone(),
            Rc::new(MarkerLocator {
                bot_login: BOT.to_string(),
            }),
            12,
            SECRET,
        )
    }

    fn link() -> DeployRequestLink {
        DeployRequestLink {
            number: 4,
            branch: "pr-x".into(),
            org: "acme".into(),
            database: "shop".into(),
        }
    }

    #[test]
    fn find_or_create_reuses_marked_comment() {
        let api = Rc::new(FakeComments::default());
        api.seed(1, "someone", &format!("quoting {MARKER}"));
        api.seed(2, BOT, "unrelated bot comment");
        api.seed(3, BOT, &render_body("<p>old</p>", SECRET));
        let reporter = reporter(&api);

        let first = reporter.find_or_create().unwrap();
        let second = reporter.find_or_create().unwrap();

        assert_eq!(first.id, 3);
        assert_eq!(first, second);
        assert_eq!(api.creates(), 0);
    }

    #[test]
    fn find_or_create_creates_once_then_rediscovers() {
        let api = Rc::new(FakeComments::default());
        let reporter = reporter(&api);

        let created = reporter.find_or_create().unwrap();
        let again = reporter.find_or_create().unwrap();

        assert_eq!(created.id, again.id);
        assert_eq!(api.creates(), 1);
        assert!(created.body.contains(MARKER));
    }

    #[test]
    fn report_replaces_body() {
        let api = Rc::new(FakeComments::default());
        let reporter = reporter(&api);

        reporter
            .report(&StatusView::AwaitingApproval {
                link: link(),
                diffs: vec![],
            })
            .unwrap();
        let msg = reporter.report(&StatusView::Merged { link: link() }).unwrap();

        assert_eq!(api.comments().len(), 1);
        let body = api.body_of(msg.id).unwrap();
        assert!(body.contains("was deployed"));
        assert!(!body.contains("Waiting for"));
        assert_eq!(body.matches(MARKER).count(), 1);
    }

    #[test]
    fn render_redacts_every_secret_occurrence() {
        let api = Rc::new(FakeComments::default());
        let reporter = reporter(&api);
        let error = format!("pscale --service-token {SECRET} failed; token {SECRET}{SECRET}");

        let body = reporter.render(&StatusView::Failed { error });

        assert!(!body.contains(SECRET));
        assert!(body.matches(REDACTED).count() >= 3);
        assert!(body.contains(MARKER));
    }

    #[test]
    fn awaiting_view_links_and_diffs() {
        let content = StatusView::AwaitingApproval {
            link: link(),
            diffs: vec![Diff {
                name: "users".into(),
                raw: "+CREATE TABLE users (id int)".into(),
                html: String::new(),
            }],
        }
        .content();
        assert!(content.contains("https://app.planetscale.com/acme/shop/deploy-requests/4"));
        assert!(content.contains("https://app.planetscale.com/acme/shop/pr-x"));
        assert!(content.contains("<summary>Schema changes (users)</summary>"));
        assert!(content.contains("```diff\n+CREATE TABLE users (id int)\n```"));
    }

    #[test]
    fn only_failure_reports_are_flagged() {
        let api = Rc::new(FakeComments::default());
        let reporter = reporter(&api);
        assert!(reporter.current().unwrap().is_none());

        reporter.report(&StatusView::Merged { link: link() }).unwrap();
        assert!(!reporter.current().unwrap().unwrap().shows_failure());

        reporter.report_failure("push exited with 1");
        assert!(reporter.current().unwrap().unwrap().shows_failure());
    }

    #[test]
    fn failure_report_is_best_effort() {
        let api = Rc::new(FakeComments::default());
        api.fail_all("service unavailable");
        reporter(&api).report_failure("boom");
        assert_eq!(api.updates(), 0);
    }

    #[test]
    fn github_client_lists_and_updates() {
        let mut server = mockito::Server::new();
        let list = server
            .mock("GET", "/repos/acme/shop/issues/12/comments")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("per_page".into(), "100".into()),
                mockito::Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .match_header("authorization", "Bearer ghs_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"[{{"id": 77, "body": "{MARKER_ID}", "user": {{"login": "{BOT}"}}}}]"#
            ))
            .create();
        let update = server
            .mock("PATCH", "/repos/acme/shop/issues/comments/77")
            .match_body(mockito::Matcher::PartialJsonString(r#"{"body": "new"}"#.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 77, "body": "new", "user": {"login": "github-actions[bot]"}}"#)
            .create();

        let settings = GithubSettings {
            token: "ghs_test".into(),
            repository: "acme/shop".into(),
            api_url: server.url(),
            server_url: "https://github.com".into(),
            bot_login: BOT.into(),
            event_path: None,
        };
        let api = GithubComments::new(&settings).unwrap();

        let comments = api.list_comments(12).unwrap();
        assert_eq!(comments.len(), 1);
        let updated = api.update_comment(77, "new").unwrap();
        assert_eq!(updated.body.as_deref(), Some("new"));

        list.assert();
        update.assert();
    }

    #[test]
    fn github_client_surfaces_status() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/repos/acme/shop/issues/12/comments")
            .with_status(403)
            .with_body("Resource not accessible by integration")
            .create();
        let settings = GithubSettings {
            token: "t".into(),
            repository: "acme/shop".into(),
            api_url: server.url(),
            server_url: "https://github.com".into(),
            bot_login: BOT.into(),
            event_path: None,
        };
        let err = GithubComments::new(&settings)
            .unwrap()
            .create_comment(12, "hi")
            .unwrap_err();
        assert!(matches!(err, DeployError::CommentApi { status: Some(403), .. }));
    }
}
