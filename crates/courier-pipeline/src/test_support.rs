//! Shared fakes for unit tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_device::{Automation, DeviceProfile, PostResult};

/// (title, body, media count) of one post.
pub type RecordedPost = (Option<String>, Option<String>, usize);

/// Automation driver that connects and posts as configured and records every call.
pub struct FakeAutomation {
    connects: bool,
    posts: bool,
    connect_calls: Mutex<usize>,
    post_calls: Mutex<Vec<RecordedPost>>,
}

impl FakeAutomation {
    pub fn new(connects: bool, posts: bool) -> Arc<Self> {
        Arc::new(Self {
            connects,
            posts,
            connect_calls: Mutex::new(0),
            post_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn connect_count(&self) -> usize {
        *self.connect_calls.lock().unwrap()
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.post_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    async fn connect(&self, _device: &DeviceProfile) -> bool {
        *self.connect_calls.lock().unwrap() += 1;
        self.connects
    }

    async fn post_content(
        &self,
        _device: &DeviceProfile,
        title: Option<&str>,
        body: Option<&str>,
        media: &[PathBuf],
    ) -> PostResult {
        self.post_calls.lock().unwrap().push((
            title.map(str::to_string),
            body.map(str::to_string),
            media.len(),
        ));
        if self.posts {
            PostResult::succeeded("published")
        } else {
            PostResult::failed("publish button not found")
        }
    }
}
