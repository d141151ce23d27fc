//! Push-subscription reconciliation against the Pub/Sub emulator
//!
//! For each event-triggered function the harness ensures a durable push
//! subscription exists that delivers topic messages to the function's local
//! endpoint. Subscription names are a deterministic function of the function
//! and topic names, so repeated sessions converge on the same resource
//! instead of piling up duplicates.

use serde_json::json;

use lofn_core::prelude::*;

/// Deterministic subscription name for a function/topic pair.
pub fn subscription_name(function_name: &str, topic: &str) -> String {
    format!("local-{function_name}-{topic}")
}

/// Everything needed to reconcile one push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub project: String,
    pub topic: String,
    pub function_name: String,
    /// `http://localhost:<assignedPort>` of the owning function runner
    pub push_endpoint: String,
}

/// The minimal Pub/Sub admin surface the reconciler needs.
///
/// Creation is not assumed idempotent, so callers check-then-create.
#[trait_variant::make(PubSubApi: Send)]
pub trait LocalPubSubApi {
    async fn topic_exists(&self, project: &str, topic: &str) -> Result<bool>;

    async fn create_topic(&self, project: &str, topic: &str) -> Result<()>;

    async fn subscription_exists(&self, project: &str, name: &str) -> Result<bool>;

    async fn create_push_subscription(
        &self,
        project: &str,
        name: &str,
        topic: &str,
        push_endpoint: &str,
    ) -> Result<()>;

    async fn update_push_endpoint(
        &self,
        project: &str,
        name: &str,
        push_endpoint: &str,
    ) -> Result<()>;
}

/// Ensure the topic exists and a push subscription delivers it to the spec's
/// endpoint: create the subscription when absent, update its push endpoint
/// when present. Safe to run every session.
pub async fn reconcile_push_subscription<A>(api: &A, spec: &SubscriptionSpec) -> Result<()>
where
    A: PubSubApi + Sync,
{
    if !api.topic_exists(&spec.project, &spec.topic).await? {
        debug!("Creating topic {}", spec.topic);
        api.create_topic(&spec.project, &spec.topic).await?;
    }

    let name = subscription_name(&spec.function_name, &spec.topic);
    if api.subscription_exists(&spec.project, &name).await? {
        api.update_push_endpoint(&spec.project, &name, &spec.push_endpoint)
            .await?;
    } else {
        api.create_push_subscription(&spec.project, &name, &spec.topic, &spec.push_endpoint)
            .await?;
    }

    info!("Push subscription {} -> {}", name, spec.push_endpoint);
    Ok(())
}

/// REST client against the emulator's Pub/Sub surface.
pub struct EmulatorPubSubClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmulatorPubSubClient {
    /// `base_url` is the emulator endpoint, e.g. `http://localhost:8085`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn topic_url(&self, project: &str, topic: &str) -> String {
        format!("{}/v1/projects/{project}/topics/{topic}", self.base_url)
    }

    fn subscription_url(&self, project: &str, name: &str) -> String {
        format!("{}/v1/projects/{project}/subscriptions/{name}", self.base_url)
    }

    /// A transport-level failure means the emulator is gone; everything else
    /// is an unexpected backend response.
    fn map_transport_err(e: reqwest::Error) -> Error {
        if e.is_connect() || e.is_timeout() {
            Error::unreachable_backend(e.to_string())
        } else {
            Error::backend(e.to_string())
        }
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_transport_err)?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::backend(format!("unexpected status {status} for {url}"))),
        }
    }

    async fn expect_success(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<()> {
        let response = request.send().await.map_err(Self::map_transport_err)?;
        if !response.status().is_success() {
            return Err(Error::backend(format!(
                "{what} failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl PubSubApi for EmulatorPubSubClient {
    async fn topic_exists(&self, project: &str, topic: &str) -> Result<bool> {
        self.exists(&self.topic_url(project, topic)).await
    }

    async fn create_topic(&self, project: &str, topic: &str) -> Result<()> {
        let request = self
            .client
            .put(self.topic_url(project, topic))
            .json(&json!({}));
        self.expect_success(request, &format!("create topic {topic}"))
            .await
    }

    async fn subscription_exists(&self, project: &str, name: &str) -> Result<bool> {
        self.exists(&self.subscription_url(project, name)).await
    }

    async fn create_push_subscription(
        &self,
        project: &str,
        name: &str,
        topic: &str,
        push_endpoint: &str,
    ) -> Result<()> {
        let body = json!({
            "topic": format!("projects/{project}/topics/{topic}"),
            "pushConfig": { "pushEndpoint": push_endpoint },
        });
        let request = self
            .client
            .put(self.subscription_url(project, name))
            .json(&body);
        self.expect_success(request, &format!("create subscription {name}"))
            .await
    }

    async fn update_push_endpoint(
        &self,
        project: &str,
        name: &str,
        push_endpoint: &str,
    ) -> Result<()> {
        let url = format!("{}:modifyPushConfig", self.subscription_url(project, name));
        let body = json!({ "pushConfig": { "pushEndpoint": push_endpoint } });
        let request = self.client.post(url).json(&body);
        self.expect_success(request, &format!("update push config for {name}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePubSubApi {
        topics: Mutex<Vec<String>>,
        /// subscription name -> (topic, push endpoint)
        subscriptions: Mutex<HashMap<String, (String, String)>>,
        unreachable: bool,
    }

    impl FakePubSubApi {
        fn check_reachable(&self) -> Result<()> {
            if self.unreachable {
                Err(Error::unreachable_backend("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    impl PubSubApi for FakePubSubApi {
        async fn topic_exists(&self, _project: &str, topic: &str) -> Result<bool> {
            self.check_reachable()?;
            Ok(self.topics.lock().unwrap().contains(&topic.to_string()))
        }

        async fn create_topic(&self, _project: &str, topic: &str) -> Result<()> {
            self.check_reachable()?;
            self.topics.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn subscription_exists(&self, _project: &str, name: &str) -> Result<bool> {
            self.check_reachable()?;
            Ok(self.subscriptions.lock().unwrap().contains_key(name))
        }

        async fn create_push_subscription(
            &self,
            _project: &str,
            name: &str,
            topic: &str,
            push_endpoint: &str,
        ) -> Result<()> {
            self.check_reachable()?;
            self.subscriptions
                .lock()
                .unwrap()
                .insert(name.to_string(), (topic.to_string(), push_endpoint.to_string()));
            Ok(())
        }

        async fn update_push_endpoint(
            &self,
            _project: &str,
            name: &str,
            push_endpoint: &str,
        ) -> Result<()> {
            self.check_reachable()?;
            let mut subscriptions = self.subscriptions.lock().unwrap();
            let entry = subscriptions
                .get_mut(name)
                .expect("update on missing subscription");
            entry.1 = push_endpoint.to_string();
            Ok(())
        }
    }

    fn spec(function: &str, topic: &str, port: u16) -> SubscriptionSpec {
        SubscriptionSpec {
            project: "demo".to_string(),
            topic: topic.to_string(),
            function_name: function.to_string(),
            push_endpoint: format!("http://localhost:{port}"),
        }
    }

    #[test]
    fn test_subscription_name_is_deterministic() {
        assert_eq!(subscription_name("a", "t1"), "local-a-t1");
        assert_eq!(subscription_name("a", "t1"), subscription_name("a", "t1"));
    }

    #[tokio::test]
    async fn test_reconcile_creates_topic_and_subscription() {
        let api = FakePubSubApi::default();
        reconcile_push_subscription(&api, &spec("a", "t1", 8080))
            .await
            .unwrap();

        assert_eq!(*api.topics.lock().unwrap(), vec!["t1".to_string()]);
        let subscriptions = api.subscriptions.lock().unwrap();
        assert_eq!(
            subscriptions.get("local-a-t1"),
            Some(&("t1".to_string(), "http://localhost:8080".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent_second_endpoint_wins() {
        let api = FakePubSubApi::default();
        reconcile_push_subscription(&api, &spec("a", "t1", 8080))
            .await
            .unwrap();
        reconcile_push_subscription(&api, &spec("a", "t1", 9090))
            .await
            .unwrap();

        // Exactly one topic and one subscription record survive, pointing at
        // the endpoint from the second run.
        assert_eq!(api.topics.lock().unwrap().len(), 1);
        let subscriptions = api.subscriptions.lock().unwrap();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(
            subscriptions.get("local-a-t1").unwrap().1,
            "http://localhost:9090"
        );
    }

    #[tokio::test]
    async fn test_reconcile_two_functions_sharing_a_topic() {
        let api = FakePubSubApi::default();
        reconcile_push_subscription(&api, &spec("a", "t1", 8080))
            .await
            .unwrap();
        reconcile_push_subscription(&api, &spec("b", "t1", 8081))
            .await
            .unwrap();

        let subscriptions = api.subscriptions.lock().unwrap();
        assert_eq!(
            subscriptions.get("local-a-t1").unwrap().1,
            "http://localhost:8080"
        );
        assert_eq!(
            subscriptions.get("local-b-t1").unwrap().1,
            "http://localhost:8081"
        );
        assert_eq!(api.topics.lock().unwrap().len(), 1, "topic created once");
    }

    #[tokio::test]
    async fn test_reconcile_surfaces_unreachable_backend() {
        let api = FakePubSubApi {
            unreachable: true,
            ..Default::default()
        };
        let result = reconcile_push_subscription(&api, &spec("a", "t1", 8080)).await;
        assert!(matches!(
            result,
            Err(Error::MessagingBackendUnreachable { .. })
        ));
    }

    #[test]
    fn test_client_urls() {
        let client = EmulatorPubSubClient::new("http://localhost:8085/");
        assert_eq!(
            client.topic_url("demo", "t1"),
            "http://localhost:8085/v1/projects/demo/topics/t1"
        );
        assert_eq!(
            client.subscription_url("demo", "local-a-t1"),
            "http://localhost:8085/v1/projects/demo/subscriptions/local-a-t1"
        );
    }
}
