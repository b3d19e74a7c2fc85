//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Renders a directory listing page linking to each child path.
#[must_use]
pub fn listing_page(children: &[&str]) -> String {
    let mut body = String::from("<html><body><pre>\n");
    for child in children {
        body.push_str(&format!("<a href=\"/{child}\">{child}</a><br>\n"));
    }
    body.push_str("</pre></body></html>\n");
    body
}

/// Mounts a listing page at `/{listing_path}`.
pub async fn mount_listing(server: &MockServer, listing_path: &str, children: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/{listing_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(children)))
        .mount(server)
        .await;
}

/// Mounts HEAD and GET for a file of `size` bytes filled with `fill`.
pub async fn mount_file(server: &MockServer, file_path: &str, size: usize, fill: u8) {
    Mock::given(method("HEAD"))
        .and(path(format!("/{file_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![fill; size]))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{file_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![fill; size]))
        .mount(server)
        .await;
}
