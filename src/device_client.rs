use crate::common::{RelayCommand, Routine, SensorResponse, Task};
use crate::config::Config;
use anyhow::Context;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone)]
pub struct DeviceClient {
    client: Client<HttpConnector>,
    address: String,
    request_timeout: Duration,
}

impl DeviceClient {
    pub fn new(config: &Config) -> DeviceClient {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.device_connection_timeout));

        DeviceClient {
            client: Client::builder().build(connector),
            address: config.device_address.trim_end_matches('/').to_string(),
            request_timeout: config.device_request_timeout,
        }
    }

    fn uri(&self, path: &str) -> anyhow::Result<Uri> {
        format!("{}{}", self.address, path)
            .parse::<Uri>()
            .with_context(|| format!("bad device uri ({}{}).", self.address, path))
    }

    async fn send(&self, request: Request<Body>) -> anyhow::Result<(StatusCode, Vec<u8>)> {
        let uri = request.uri().clone();
        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>((status, body.to_vec()))
        };

        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .with_context(|| format!("request timeout expired ({}).", uri))?
            .with_context(|| format!("request failed ({}).", uri))
    }

    async fn post_form(&self, path: &str, body: String) -> anyhow::Result<StatusCode> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(path)?)
            .header(USER_AGENT, "agri-dash")
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(Body::from(body))?;

        let (status, _) = self.send(request).await?;
        Ok(status)
    }

    /// Any JSON body is read, whatever the status code; a body that is not
    /// JSON is an error.
    pub async fn request_sensor(&self) -> anyhow::Result<SensorResponse> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.uri("/sensor")?)
            .header(USER_AGENT, "agri-dash")
            .body(Body::empty())?;

        let (status, body) = self.send(request).await?;
        debug!("sensor response: {} ({} bytes)", status, body.len());

        serde_json::from_slice(&body)
            .with_context(|| format!("malformed sensor response (status: {}).", status))
    }

    /// Completes on any HTTP response; the device is not asked to confirm.
    pub async fn request_relay_action(&self, command: &RelayCommand) -> anyhow::Result<()> {
        let status = self.post_form("/relay", command.form_body()).await?;
        info!("request relay action: {:?} is {}", command, status);
        Ok(())
    }

    pub async fn request_set_routine(&self, routine: &Routine) -> anyhow::Result<()> {
        let status = self.post_form("/set_routine", routine.form_body()).await?;
        info!("request set routine: {:?} is {}", routine, status);
        Ok(())
    }
}

/// Polls the sensor right away and then once per `interval`, until the
/// receiving side goes away.
pub async fn poll_sensor(device: DeviceClient, interval: Duration, sender: UnboundedSender<Task>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let response = device.request_sensor().await;
        if let Err(e) = &response {
            warn!("sensor fetch failed ({:?})", e);
        }
        if let Err(e) = sender.send(Task::Sensor(Box::new(response))) {
            warn!("send to dashboard failed ({:?})", e);
            break;
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::common::RelayIndex;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Response, Server};
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    #[derive(Debug, PartialEq)]
    pub struct Recorded {
        pub method: Method,
        pub path: String,
        pub content_type: Option<String>,
        pub body: String,
    }

    /// Stand-in for the device: answers `/sensor` with `sensor_body` and
    /// records every request it sees.
    pub async fn spawn_device(sensor_body: &'static str) -> (String, UnboundedReceiver<Recorded>) {
        let (sender, receiver) = unbounded_channel();

        let make_svc = make_service_fn(move |_| {
            let sender = sender.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                    let sender = sender.clone();
                    async move {
                        let method = request.method().clone();
                        let path = request.uri().path().to_string();
                        let content_type = request
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let body = hyper::body::to_bytes(request.into_body())
                            .await
                            .map(|b| String::from_utf8_lossy(&b).into_owned())
                            .unwrap_or_default();

                        let reply = if path == "/sensor" { sensor_body } else { "OK" };
                        let _ = sender.send(Recorded {
                            method,
                            path,
                            content_type,
                            body,
                        });
                        Ok::<_, Infallible>(Response::new(Body::from(reply)))
                    }
                }))
            }
        });

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = Server::bind(&addr).serve(make_svc);
        let address = format!("http://{}", server.local_addr());
        tokio::spawn(server);

        (address, receiver)
    }

    /// An address nothing listens on.
    pub fn dead_address() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    pub fn test_config(address: &str) -> Config {
        let mut config = Config::read_from_str("[main]\nlog_level = \"debug\"\n").unwrap();
        config.override_device_address(address).unwrap();
        config.device_request_timeout = Duration::from_secs(2);
        config
    }

    #[tokio::test]
    async fn reads_sensor() {
        let (address, mut requests) =
            spawn_device(r#"{"temperature": 23.46, "humidity": 51}"#).await;
        let device = DeviceClient::new(&test_config(&address));

        let response = device.request_sensor().await.unwrap();
        assert_eq!(response.temperature, Some(23.46));
        assert_eq!(response.humidity, Some(51.0));

        let recorded = requests.recv().await.unwrap();
        assert_eq!(recorded.method, Method::GET);
        assert_eq!(recorded.path, "/sensor");
    }

    #[tokio::test]
    async fn malformed_sensor_body_is_an_error() {
        let (address, _requests) = spawn_device("<html>busy</html>").await;
        let device = DeviceClient::new(&test_config(&address));

        assert!(device.request_sensor().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_device_is_an_error() {
        let device = DeviceClient::new(&test_config(&dead_address()));

        assert!(device.request_sensor().await.is_err());
        let command = RelayCommand {
            relay: RelayIndex::new(0).unwrap(),
            state: true,
            duration_secs: 0,
        };
        assert!(device.request_relay_action(&command).await.is_err());
    }

    #[tokio::test]
    async fn posts_relay_form() {
        let (address, mut requests) = spawn_device("{}").await;
        let device = DeviceClient::new(&test_config(&format!("{}/", address)));

        let command = RelayCommand {
            relay: RelayIndex::new(2).unwrap(),
            state: false,
            duration_secs: 0,
        };
        device.request_relay_action(&command).await.unwrap();

        let recorded = requests.recv().await.unwrap();
        assert_eq!(
            recorded,
            Recorded {
                method: Method::POST,
                path: "/relay".to_string(),
                content_type: Some(FORM_CONTENT_TYPE.to_string()),
                body: "relay=3&state=false&duration=0".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn posts_routine_form() {
        let (address, mut requests) = spawn_device("{}").await;
        let device = DeviceClient::new(&test_config(&address));

        let routine = Routine {
            relay: RelayIndex::new(3).unwrap(),
            hour: 18,
            minute: 0,
            duration_min: 45,
        };
        device.request_set_routine(&routine).await.unwrap();

        let recorded = requests.recv().await.unwrap();
        assert_eq!(recorded.path, "/set_routine");
        assert_eq!(recorded.body, "relay=4&hour=18&minute=0&duration=45");
    }

    #[tokio::test]
    async fn poller_fetches_immediately() {
        let (address, mut requests) = spawn_device(r#"{"humidity": 70.25}"#).await;
        let device = DeviceClient::new(&test_config(&address));
        let (sender, mut receiver) = unbounded_channel();

        let poller = tokio::spawn(poll_sensor(device, Duration::from_secs(3600), sender));

        match receiver.recv().await {
            Some(Task::Sensor(response)) => {
                let response = (*response).as_ref().unwrap();
                assert_eq!(response.humidity, Some(70.25));
                assert_eq!(response.temperature, None);
            }
            other => panic!("unexpected task {:?}", other),
        }
        assert_eq!(requests.recv().await.unwrap().path, "/sensor");

        drop(receiver);
        poller.abort();
    }

    #[tokio::test]
    async fn poller_repeats_every_interval() {
        let (address, mut requests) = spawn_device(r#"{"temperature": 18.5}"#).await;
        let device = DeviceClient::new(&test_config(&address));
        let (sender, mut receiver) = unbounded_channel();

        let poller = tokio::spawn(poll_sensor(device, Duration::from_millis(50), sender));

        for _ in 0..3 {
            let task = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(task, Task::Sensor(response) if response.is_ok()));
            assert_eq!(requests.recv().await.unwrap().path, "/sensor");
        }

        poller.abort();
    }

    #[tokio::test]
    async fn poller_keeps_going_after_failures() {
        let device = DeviceClient::new(&test_config(&dead_address()));
        let (sender, mut receiver) = unbounded_channel();

        let poller = tokio::spawn(poll_sensor(device, Duration::from_millis(50), sender));

        for _ in 0..2 {
            let task = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(task, Task::Sensor(response) if response.is_err()));
        }
        assert!(!poller.is_finished());

        poller.abort();
    }

    #[tokio::test]
    async fn silent_device_hits_request_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let silent = tokio::spawn(async move {
            let mut held = vec![];
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let mut config = test_config(&address);
        config.device_request_timeout = Duration::from_millis(200);
        let device = DeviceClient::new(&config);

        let started = tokio::time::Instant::now();
        let result = device.request_sensor().await;

        assert!(result.is_err());
        assert!(format!("{:?}", result.unwrap_err()).contains("request timeout expired"));
        assert!(started.elapsed() < Duration::from_secs(2));

        silent.abort();
    }
}
