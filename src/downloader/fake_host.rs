//! A local stand-in for the file host, used by tests.
//!
//! Serves a landing page with the hidden download form and answers form submits
//! from a script, one entry per submit.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// How the host answers one form submit
#[derive(Debug, Clone)]
pub enum Submit {
    Body { content_type: String, body: Vec<u8> },
    Status(u16),
    /// `chunks` pieces of `chunk`, each after `delay`, with no length header
    Slow {
        chunks: usize,
        chunk: Vec<u8>,
        delay: Duration,
    },
}

impl Submit {
    pub fn file(body: Vec<u8>) -> Self {
        Self::typed("application/octet-stream", body)
    }

    pub fn typed(content_type: &str, body: Vec<u8>) -> Self {
        Self::Body {
            content_type: content_type.to_string(),
            body,
        }
    }

    pub fn holding_page() -> Self {
        Self::typed(
            "text/html; charset=utf-8",
            b"<html><body>Please wait...</body></html>".to_vec(),
        )
    }

    pub fn status(code: u16) -> Self {
        Self::Status(code)
    }

    pub fn slow(chunks: usize, chunk_size: usize, delay: Duration) -> Self {
        Self::Slow {
            chunks,
            chunk: vec![b'x'; chunk_size],
            delay,
        }
    }
}

struct HostState {
    script: Mutex<VecDeque<Submit>>,
    with_form: bool,
    page_visits: AtomicUsize,
    submits: AtomicUsize,
}

pub struct FakeHost {
    addr: SocketAddr,
    state: Arc<HostState>,
}

const PAGE_WITH_FORM: &str = r#"<html><body>
<h1 class="section_title">Sample File.mkv</h1>
<form action="/search" method="get"><input name="q"></form>
<form action="/free/abc" method="post"><button>Download</button></form>
<table><tr><td class="footer-video-size">1.2 GB</td></tr></table>
</body></html>"#;

const PAGE_WITHOUT_FORM: &str = r#"<html><body>
<h1 class="section_title">Sample File.mkv</h1>
<form action="/login" method="post"></form>
</body></html>"#;

async fn landing_page(State(state): State<Arc<HostState>>) -> Html<&'static str> {
    state.page_visits.fetch_add(1, Ordering::SeqCst);
    if state.with_form {
        Html(PAGE_WITH_FORM)
    } else {
        Html(PAGE_WITHOUT_FORM)
    }
}

async fn submit_form(State(state): State<Arc<HostState>>) -> Response {
    state.submits.fetch_add(1, Ordering::SeqCst);
    let next = state.script.lock().unwrap().pop_front();
    match next {
        Some(Submit::Body { content_type, body }) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Some(Submit::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(Submit::Slow {
            chunks,
            chunk,
            delay,
        }) => {
            let stream = futures_util::stream::iter(0..chunks).then(move |_| {
                let chunk = chunk.clone();
                async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, std::io::Error>(chunk)
                }
            });
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                Body::from_stream(stream),
            )
                .into_response()
        }
        None => StatusCode::GONE.into_response(),
    }
}

impl FakeHost {
    async fn serve(script: Vec<Submit>, with_form: bool) -> Self {
        let state = Arc::new(HostState {
            script: Mutex::new(script.into()),
            with_form,
            page_visits: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/file/abc", get(landing_page))
            .route("/free/abc", post(submit_form))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// A host whose submits are answered from `script`, in order.
    pub async fn start(script: Vec<Submit>) -> Self {
        Self::serve(script, true).await
    }

    /// A host whose page never carries a download form.
    pub async fn without_form() -> Self {
        Self::serve(Vec::new(), false).await
    }

    pub fn page_url(&self) -> String {
        format!("http://{}/file/abc", self.addr)
    }

    pub fn missing_url(&self) -> String {
        format!("http://{}/missing", self.addr)
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn page_visits(&self) -> usize {
        self.state.page_visits.load(Ordering::SeqCst)
    }

    pub fn submits(&self) -> usize {
        self.state.submits.load(Ordering::SeqCst)
    }
}
