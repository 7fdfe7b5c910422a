//! Router proxy server — accept loop and upstream streaming.

use std::net::SocketAddr;

use anyhow::Context;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST};
use http::{HeaderValue, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use bakery_state::{SliceStatus, Store};

use crate::headers::{append_forwarded_for, forwarded_port, forwarded_proto, normalize_host};

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Bind the router listener on loopback, trying each candidate port in
/// order and falling back to an OS-assigned port when none is free.
pub async fn bind_first_free(candidates: &[u16]) -> std::io::Result<TcpListener> {
    for &port in candidates {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => debug!(port, error = %e, "router port candidate unavailable"),
        }
    }
    TcpListener::bind(("127.0.0.1", 0)).await
}

/// Host-header reverse proxy. Holds a store handle for route lookups;
/// requests are otherwise independent and served concurrently.
pub struct RouterProxy {
    store: Store,
}

impl RouterProxy {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Serve connections until the shutdown signal flips. Spawns a task per
    /// connection using HTTP/1.1; in-flight upstream streams are dropped
    /// with their connections.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "router proxy listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    let store = self.store.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req: Request<Incoming>| {
                            let store = store.clone();
                            async move {
                                Ok::<_, hyper::Error>(handle(store, peer_addr, req).await)
                            }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                            debug!(%peer_addr, error = %e, "proxy connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("router proxy shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Route one request: resolve the host, check the slice is running, proxy
/// to the upstream port on loopback.
async fn handle(store: Store, peer: SocketAddr, req: Request<Incoming>) -> Response<ProxyBody> {
    let original_host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let host = original_host.as_deref().map(normalize_host).unwrap_or_default();
    if host.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing Host header");
    }

    let route = match store.get_host_route(&host).await {
        Ok(Some(route)) => route,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &format!("No route found for host '{host}'"),
            );
        }
        Err(e) => {
            error!(error = %e, %host, "route lookup failed");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    if route.slice_status != SliceStatus::Running {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Slice is not active");
    }

    match forward(req, original_host.as_deref(), peer, route.allocated_port).await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, %host, port = route.allocated_port, "upstream failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                &format!("Upstream connection failed: {e:#}"),
            )
        }
    }
}

/// Dial the upstream on loopback and stream the request through, applying
/// forwarded-header hygiene. The response body streams back to the client.
async fn forward(
    mut req: Request<Incoming>,
    original_host: Option<&str>,
    peer: SocketAddr,
    port: u16,
) -> anyhow::Result<Response<ProxyBody>> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .with_context(|| format!("connect 127.0.0.1:{port}"))?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .context("upstream handshake")?;

    // Drive the upstream connection for the lifetime of the exchange.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    // Same method and path, origin-form.
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    *req.uri_mut() = path_and_query.parse().context("rebuild upstream uri")?;

    let proto = forwarded_proto(req.headers().get("x-forwarded-proto"));
    let fwd_port = forwarded_port(original_host, &proto);
    let fwd_for = append_forwarded_for(req.headers().get("x-forwarded-for"), peer.ip());

    let headers = req.headers_mut();
    headers.remove(CONNECTION);
    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", HeaderValue::from_str(host)?);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_str(&proto)?);
    headers.insert("x-forwarded-port", HeaderValue::from_str(&fwd_port)?);
    headers.insert("x-forwarded-for", HeaderValue::from_str(&fwd_for)?);

    let response = sender.send_request(req).await.context("upstream request")?;
    Ok(response.map(|body| body.boxed()))
}

fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full(body))
        .unwrap()
}

fn full(body: String) -> ProxyBody {
    Full::new(Bytes::from(body))
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Empty;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::watch;

    use bakery_state::{Expose, NewSlice, NewSliceResource, Protocol, SliceWithResources};

    const SLICE_HOST: &str = "my-app-s1.localtest.me";

    /// Upstream that echoes the request's routing-relevant headers as JSON.
    async fn start_upstream() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let svc = service_fn(|req: Request<Incoming>| async move {
                        let get = |name: &str| {
                            req.headers()
                                .get(name)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string)
                        };
                        let body = serde_json::json!({
                            "method": req.method().as_str(),
                            "path": req.uri().path(),
                            "xfHost": get("x-forwarded-host"),
                            "xfProto": get("x-forwarded-proto"),
                            "xfPort": get("x-forwarded-port"),
                            "xfFor": get("x-forwarded-for"),
                            "connection": get("connection"),
                        })
                        .to_string();
                        Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(body))))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });
        port
    }

    async fn seed_route(store: &Store, upstream_port: u16) -> SliceWithResources {
        let pie = store.create_pie("My App", "my-app").await.unwrap();
        store
            .create_slice_with_resources(
                NewSlice {
                    pie_id: pie.id.clone(),
                    ordinal: 1,
                    host: SLICE_HOST.to_string(),
                    status: bakery_state::SliceStatus::Running,
                },
                vec![NewSliceResource {
                    key: "app".to_string(),
                    protocol: Protocol::Http,
                    expose: Expose::Primary,
                    allocated_port: upstream_port,
                    route_host: Some(SLICE_HOST.to_string()),
                }],
            )
            .await
            .unwrap()
    }

    async fn start_proxy(store: Store) -> (u16, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            let _ = RouterProxy::new(store).serve(listener, rx).await;
        });
        (port, tx)
    }

    async fn send(
        proxy_port: u16,
        path: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, serde_json::Value) {
        let stream = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = builder.body(Empty::<Bytes>::new()).unwrap();

        let response = sender.send_request(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn proxies_to_upstream_with_forwarded_headers() {
        let upstream_port = start_upstream().await;
        let store = Store::open_in_memory().await.unwrap();
        seed_route(&store, upstream_port).await;
        let (proxy_port, _shutdown) = start_proxy(store).await;

        let host_header = format!("{SLICE_HOST}:{proxy_port}");
        let (status, body) = send(proxy_port, "/", &[("host", host_header.as_str())]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "GET");
        assert_eq!(body["path"], "/");
        assert_eq!(body["xfHost"], host_header.as_str());
        assert_eq!(body["xfProto"], "http");
        assert_eq!(body["xfPort"], proxy_port.to_string().as_str());
        assert_eq!(body["xfFor"], "127.0.0.1");
        assert_eq!(body["connection"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn forwarded_proto_chain_drives_port_default() {
        let upstream_port = start_upstream().await;
        let store = Store::open_in_memory().await.unwrap();
        seed_route(&store, upstream_port).await;
        let (proxy_port, _shutdown) = start_proxy(store).await;

        // Portless Host plus an upstream proto chain: proto wins the port.
        let (status, body) = send(
            proxy_port,
            "/",
            &[("host", SLICE_HOST), ("x-forwarded-proto", "HTTPS, http")],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["xfProto"], "https");
        assert_eq!(body["xfPort"], "443");
    }

    #[tokio::test]
    async fn missing_host_header_is_bad_request() {
        let store = Store::open_in_memory().await.unwrap();
        let (proxy_port, _shutdown) = start_proxy(store).await;

        // HTTP/1.0 request with no Host header at all.
        let mut stream = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.0\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let status_line = response.lines().next().unwrap_or_default();
        assert!(status_line.contains(" 400 "), "got: {status_line}");
        assert!(response.contains(r#"{"error":"Missing Host header"}"#), "got: {response}");
    }

    #[tokio::test]
    async fn unknown_host_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let (proxy_port, _shutdown) = start_proxy(store).await;

        let (status, body) = send(proxy_port, "/", &[("host", "nobody.localtest.me")]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No route found for host 'nobody.localtest.me'");
    }

    #[tokio::test]
    async fn stopped_slice_is_unavailable() {
        let upstream_port = start_upstream().await;
        let store = Store::open_in_memory().await.unwrap();
        let slice = seed_route(&store, upstream_port).await;
        store.stop_slice(&slice.slice.id).await.unwrap();
        let (proxy_port, _shutdown) = start_proxy(store).await;

        let (status, body) = send(proxy_port, "/", &[("host", SLICE_HOST)]).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Slice is not active");
    }

    #[tokio::test]
    async fn dead_upstream_is_bad_gateway() {
        let store = Store::open_in_memory().await.unwrap();
        // Allocate a port, then let the listener go so nothing serves it.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);
        seed_route(&store, dead_port).await;
        let (proxy_port, _shutdown) = start_proxy(store).await;

        let (status, body) = send(proxy_port, "/", &[("host", SLICE_HOST)]).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Upstream connection failed:"), "got: {message}");
    }

    #[tokio::test]
    async fn bind_first_free_walks_candidates() {
        // Occupy the first candidate; the second should win.
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let held_port = held.local_addr().unwrap().port();
        let free = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let free_port = free.local_addr().unwrap().port();
        drop(free);

        let listener = bind_first_free(&[held_port, free_port]).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), free_port);
    }

    #[tokio::test]
    async fn bind_first_free_falls_back_to_os_assigned() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let held_port = held.local_addr().unwrap().port();

        let listener = bind_first_free(&[held_port]).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_ne!(port, held_port);
        assert!(port > 0);
    }
}
