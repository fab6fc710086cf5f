//! Shared harness for the HTTP tests: a real server on an ephemeral port,
//! backed by the in-memory adapters.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use portal_lib::adapters::{MemoryDocumentStore, MemoryIdentity, MemoryObjectStorage};
use portal_lib::config::Config;
use portal_lib::web::{build_router, state::AppState};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Response};
use serde_json::Value;
use tokio::net::TcpListener;

pub const ADMIN_EMAIL: &str = "moderacion@portal.ar";
pub const ADMIN_PASSWORD: &str = "malvinas1982";
pub const VISITOR_EMAIL: &str = "vecino@portal.ar";
pub const VISITOR_PASSWORD: &str = "contraseña";

pub const RELATO_CONTENT: &str =
    "Llegamos al puerto una mañana fría de junio y nadie hablaba. Mi padre guardó la carta durante cuarenta años.";

pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    pub identity: Arc<MemoryIdentity>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let config = Config::from_lookup(move |key: &str| match key {
            "PORTAL_BACKEND" => Some("memory".to_string()),
            "BIND_ADDRESS" => Some(addr.to_string()),
            _ => None,
        })
        .expect("memory config");

        let identity = Arc::new(MemoryIdentity::new());
        identity.add_account(ADMIN_EMAIL, ADMIN_PASSWORD, true).await;
        identity.add_account(VISITOR_EMAIL, VISITOR_PASSWORD, false).await;
        let media = Arc::new(MemoryObjectStorage::new(format!("http://{}/media", addr)));
        let state = AppState::new(
            Arc::new(config),
            Arc::new(MemoryDocumentStore::new()),
            media.clone(),
            identity.clone(),
        )
        .with_media(media);

        let app = build_router(Arc::new(state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            identity,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client.get(self.url(path)).send().await.expect("GET")
    }

    pub async fn get_as(&self, path: &str, cookie: &str) -> Response {
        self.client
            .get(self.url(path))
            .header(header::COOKIE, cookie)
            .send()
            .await
            .expect("GET with cookie")
    }

    pub async fn post_as(&self, path: &str, cookie: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .header(header::COOKIE, cookie)
            .json(&body)
            .send()
            .await
            .expect("POST with cookie")
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login")
    }

    /// Signs in as the seeded administrator and returns the `Cookie` value.
    pub async fn admin_cookie(&self) -> String {
        let response = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(response.status(), 200);
        session_cookie(&response)
    }

    pub async fn submit(&self, path: &str, form: Form) -> Response {
        self.client
            .post(self.url(path))
            .header("x-forwarded-for", "203.0.113.7")
            .header(header::USER_AGENT, "portal-tests")
            .multipart(form)
            .send()
            .await
            .expect("submit form")
    }

    /// Submits a valid relato and returns its id.
    pub async fn submit_relato(&self, title: &str) -> String {
        let response = self.submit("/relato/formulario", relato_form(title, png(64, 48))).await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("json");
        body["id"].as_str().expect("id").to_string()
    }

    pub async fn submit_portal_memoria(&self, description: &str) -> String {
        let response = self
            .submit("/portal-memoria/formulario", portal_memoria_form(description, png(64, 48)))
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("json");
        body["id"].as_str().expect("id").to_string()
    }
}

/// The `name=value` pair of the session cookie a response set.
pub fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 120]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub fn image_part(file_name: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str("image/png")
        .expect("mime")
}

fn submitter_fields() -> Form {
    Form::new()
        .text("name", "María José")
        .text("surname", "Fernández")
        .text("phone", "+54 2964 123456")
}

pub fn relato_form(title: &str, dni: Vec<u8>) -> Form {
    submitter_fields()
        .text("title", title.to_string())
        .text("content", RELATO_CONTENT)
        .part("dni_image", image_part("dni.png", dni))
        .part("banner_image", image_part("banner.png", png(320, 180)))
}

pub fn portal_memoria_form(description: &str, dni: Vec<u8>) -> Form {
    submitter_fields()
        .text("description", description.to_string())
        .part("dni_image", image_part("dni.png", dni))
        .part("image", image_part("foto.png", png(200, 200)))
}
