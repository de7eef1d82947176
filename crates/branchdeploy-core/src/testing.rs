//! Test doubles shared by the unit tests.

use crate::config::RemoteAuth;
use crate::error::{DeployError, Result};
use crate::poll::Sleeper;
use crate::remote::CommandRunner;
use crate::status::CommentsApi;
use crate::types::{Comment, CommentUser};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

pub const SECRET: &str = "pscale_tkn_s3cr3t";
pub const BOT: &str = "github-actions[bot]";

pub fn test_auth() -> RemoteAuth {
    RemoteAuth {
        database: "shop".into(),
        service_token_id: "token-id".into(),
        service_token: SECRET.into(),
        org: "acme".into(),
    }
}

// ---------------------------------------------------------------------------
// FakeRunner
// ---------------------------------------------------------------------------

type Response = std::result::Result<String, String>;

#[derive(Default)]
struct RunnerState {
    responses: HashMap<(String, String), VecDeque<Response>>,
    calls: Vec<Vec<String>>,
}

/// Scripted `pscale` stand-in. Responses are queued per `category action`;
/// the last queued response repeats once the queue is down to one.
#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Rc<RefCell<RunnerState>>,
}

impl FakeRunner {
    pub fn respond(&self, category: &str, action: &str, response: Response) {
        self.state
            .borrow_mut()
            .responses
            .entry((category.to_string(), action.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.borrow().calls.clone()
    }

    /// `category action` of every call, in order.
    pub fn verbs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c[0], c[1]))
            .collect()
    }

    pub fn count(&self, category: &str, action: &str) -> usize {
        let verb = format!("{category} {action}");
        self.verbs().iter().filter(|v| **v == verb).count()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, args: &[String]) -> Response {
        let mut state = self.state.borrow_mut();
        state.calls.push(args.to_vec());
        let key = (args[0].clone(), args[1].clone());
        let Some(queue) = state.responses.get_mut(&key) else {
            return Err(format!("no scripted response for {} {}", key.0, key.1));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Err("empty".into()))
        } else {
            queue.front().cloned().unwrap_or_else(|| Err("empty".into()))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

// ---------------------------------------------------------------------------
// FakeComments
// ---------------------------------------------------------------------------

/// In-memory comment thread for a single pull request.
#[derive(Default)]
pub struct FakeComments {
    comments: RefCell<Vec<Comment>>,
    creates: RefCell<usize>,
    updates: RefCell<usize>,
    fail_with: RefCell<Option<String>>,
}

impl FakeComments {
    pub fn seed(&self, id: u64, login: &str, body: &str) {
        self.comments.borrow_mut().push(Comment {
            id,
            body: Some(body.to_string()),
            user: Some(CommentUser {
                login: login.to_string(),
            }),
        });
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments.borrow().clone()
    }

    pub fn body_of(&self, id: u64) -> Option<String> {
        self.comments
            .borrow()
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.body.clone())
    }

    pub fn creates(&self) -> usize {
        *self.creates.borrow()
    }

    pub fn updates(&self) -> usize {
        *self.updates.borrow()
    }

    pub fn fail_all(&self, message: &str) {
        *self.fail_with.borrow_mut() = Some(message.to_string());
    }

    fn check(&self) -> Result<()> {
        match self.fail_with.borrow().as_ref() {
            Some(message) => Err(DeployError::CommentApi {
                status: Some(500),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl CommentsApi for FakeComments {
    fn list_comments(&self, _issue: u64) -> Result<Vec<Comment>> {
        self.check()?;
        Ok(self.comments())
    }

    fn create_comment(&self, _issue: u64, body: &str) -> Result<Comment> {
        self.check()?;
        *self.creates.borrow_mut() += 1;
        let id = 1000 + self.comments.borrow().len() as u64;
        let comment = Comment {
            id,
            body: Some(body.to_string()),
            user: Some(CommentUser {
                login: BOT.to_string(),
            }),
        };
        self.comments.borrow_mut().push(comment.clone());
        Ok(comment)
    }

    fn update_comment(&self, id: u64, body: &str) -> Result<Comment> {
        self.check()?;
        *self.updates.borrow_mut() += 1;
        let mut comments = self.comments.borrow_mut();
        let comment = comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DeployError::CommentApi {
                status: Some(404),
                message: format!("comment {id} not found"),
            })?;
        comment.body = Some(body.to_string());
        Ok(comment.clone())
    }
}
