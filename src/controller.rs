use crate::client::GatewayClient;
use crate::gateway::{ChatRequest, ImageRequest};
use crate::models::{Message, MessageType};
use crate::storage::ConversationStore;
use anyhow::Result;
use std::sync::Arc;

// Shown when the gateway call itself fails (network, decode).
pub const TRANSPORT_FALLBACK: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

// Shown when a gateway body carries neither a usable payload nor an error.
const CHAT_EMPTY_FALLBACK: &str = "Unable to get response.";
const IMAGE_EMPTY_FALLBACK: &str = "Unable to process image request.";

/// Owner of the session state: the append-only message list and the loading
/// flag. One controller per front-end session; `submit` runs one dispatch to
/// completion at a time (single-flight).
pub struct ChatController {
    messages: Vec<Message>,
    loading: bool,
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn GatewayClient>,
}

impl ChatController {
    pub fn new(store: Arc<dyn ConversationStore>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self {
            messages: Vec::new(),
            loading: false,
            store,
            gateway,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True while a dispatch is in flight; the composer binds its disabled
    /// state to this.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Replaces the session wholesale from the store. A load failure is
    /// logged and leaves the current state untouched.
    pub async fn load_history(&mut self) {
        match self.store.select_all().await {
            Ok(messages) => {
                log::info!("Loaded {} messages from store", messages.len());
                self.messages = messages;
            }
            Err(err) => log::warn!("Failed to load conversation history: {:#}", err),
        }
    }

    /// Dispatches one user submission: append + persist the user message,
    /// call the gateway for the given mode, then append + persist exactly one
    /// assistant reply (real, error text, or placeholder). Blank input and
    /// re-entrant submissions are silently ignored.
    pub async fn submit(&mut self, content: &str, image: Option<String>, mode: MessageType) {
        let content = content.trim();
        if content.is_empty() || self.loading {
            return;
        }

        let user_message = Message::user(content.to_string(), image.clone(), mode);
        self.messages.push(user_message.clone());
        // Persisted before the reply is requested; a failure never rolls
        // back the in-memory append.
        self.persist(&user_message).await;

        self.loading = true;

        let assistant = match mode {
            MessageType::Image | MessageType::ImageToImage => {
                self.dispatch_image(content, image, mode).await
            }
            MessageType::Text => self.dispatch_chat(content, image).await,
        }
        .unwrap_or_else(|err| {
            log::error!("Gateway dispatch failed: {:#}", err);
            Message::assistant(TRANSPORT_FALLBACK.to_string(), MessageType::Text)
        });

        self.messages.push(assistant.clone());
        self.persist(&assistant).await;
        self.loading = false;
    }

    async fn dispatch_chat(&self, content: &str, image: Option<String>) -> Result<Message> {
        let reply = self
            .gateway
            .chat(ChatRequest {
                message: content.to_string(),
                image,
            })
            .await?;

        let content = first_usable([reply.response, reply.error])
            .unwrap_or_else(|| CHAT_EMPTY_FALLBACK.to_string());
        Ok(Message::assistant(content, MessageType::Text))
    }

    async fn dispatch_image(
        &self,
        content: &str,
        image: Option<String>,
        mode: MessageType,
    ) -> Result<Message> {
        let reply = self
            .gateway
            .image(ImageRequest {
                prompt: content.to_string(),
                source_image: image,
            })
            .await?;

        let content = first_usable([reply.description, reply.error])
            .unwrap_or_else(|| IMAGE_EMPTY_FALLBACK.to_string());
        Ok(Message::assistant(content, mode))
    }

    // Best-effort: the write is awaited so ordering holds, but a failure is
    // only logged.
    async fn persist(&self, message: &Message) {
        if let Err(err) = self.store.insert(message).await {
            log::warn!("Failed to persist message {}: {:#}", message.id, err);
        }
    }
}

// Empty strings fall through to the next candidate, so a gateway body with
// `"response": ""` still reaches the error text or the fixed fallback.
fn first_usable(candidates: [Option<String>; 2]) -> Option<String> {
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatReply, ImageReply};
    use crate::models::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        messages: Mutex<Vec<Message>>,
        fail_inserts: bool,
    }

    #[async_trait]
    impl ConversationStore for MemoryStore {
        async fn insert(&self, message: &Message) -> Result<()> {
            if self.fail_inserts {
                anyhow::bail!("disk full");
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn select_all(&self) -> Result<Vec<Message>> {
            Ok(self.messages.lock().unwrap().clone())
        }
    }

    enum MockOutcome {
        Body {
            primary: Option<&'static str>,
            error: Option<&'static str>,
        },
        Fail,
    }

    struct MockGateway {
        outcome: MockOutcome,
        chat_calls: Mutex<Vec<ChatRequest>>,
        image_calls: Mutex<Vec<ImageRequest>>,
    }

    impl MockGateway {
        fn new(outcome: MockOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                chat_calls: Mutex::new(Vec::new()),
                image_calls: Mutex::new(Vec::new()),
            })
        }

        fn replying(text: &'static str) -> Arc<Self> {
            Self::new(MockOutcome::Body {
                primary: Some(text),
                error: None,
            })
        }
    }

    #[async_trait]
    impl GatewayClient for MockGateway {
        async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
            self.chat_calls.lock().unwrap().push(request);
            match &self.outcome {
                MockOutcome::Body { primary, error } => Ok(ChatReply {
                    response: primary.map(str::to_string),
                    error: error.map(str::to_string),
                }),
                MockOutcome::Fail => anyhow::bail!("connection refused"),
            }
        }

        async fn image(&self, request: ImageRequest) -> Result<ImageReply> {
            self.image_calls.lock().unwrap().push(request);
            match &self.outcome {
                MockOutcome::Body { primary, error } => Ok(ImageReply {
                    description: primary.map(str::to_string),
                    error: error.map(str::to_string),
                }),
                MockOutcome::Fail => anyhow::bail!("connection refused"),
            }
        }
    }

    fn controller(
        store: Arc<MemoryStore>,
        gateway: Arc<MockGateway>,
    ) -> ChatController {
        ChatController::new(store, gateway)
    }

    #[tokio::test]
    async fn blank_submission_is_ignored() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::replying("hello");
        let mut ctl = controller(store.clone(), gateway.clone());

        ctl.submit("   \n\t", None, MessageType::Text).await;

        assert!(ctl.messages().is_empty());
        assert!(!ctl.is_loading());
        assert!(gateway.chat_calls.lock().unwrap().is_empty());
        assert!(store.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submission_while_loading_is_ignored() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::replying("hello");
        let mut ctl = controller(store.clone(), gateway.clone());

        ctl.loading = true;
        ctl.submit("hi", None, MessageType::Text).await;

        assert!(ctl.messages().is_empty());
        assert!(gateway.chat_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_submission_appends_user_then_assistant() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::replying("hello back");
        let mut ctl = controller(store.clone(), gateway);

        ctl.submit("hi", None, MessageType::Text).await;

        let messages = ctl.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "hello back");
        assert_eq!(messages[1].message_type, MessageType::Text);
        assert!(messages[1].timestamp >= messages[0].timestamp);
        assert!(!ctl.is_loading());

        // Both persisted, user first.
        let persisted = store.messages.lock().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].role, Role::User);
        assert_eq!(persisted[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn text_mode_routes_to_chat_gateway_with_attachment() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::replying("ok");
        let mut ctl = controller(store, gateway.clone());

        ctl.submit("look at this", Some("Zm9v".to_string()), MessageType::Text)
            .await;

        let chat_calls = gateway.chat_calls.lock().unwrap();
        assert_eq!(chat_calls.len(), 1);
        assert_eq!(chat_calls[0].message, "look at this");
        assert_eq!(chat_calls[0].image.as_deref(), Some("Zm9v"));
        assert!(gateway.image_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_mode_routes_to_image_gateway() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::replying("a sunny field");
        let mut ctl = controller(store, gateway.clone());

        ctl.submit("a field", None, MessageType::Image).await;

        let image_calls = gateway.image_calls.lock().unwrap();
        assert_eq!(image_calls.len(), 1);
        assert_eq!(image_calls[0].prompt, "a field");
        assert!(image_calls[0].source_image.is_none());
        assert!(gateway.chat_calls.lock().unwrap().is_empty());

        assert_eq!(ctl.messages()[1].message_type, MessageType::Image);
    }

    #[tokio::test]
    async fn image_to_image_passes_source_image() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::replying("a similar cat");
        let mut ctl = controller(store, gateway.clone());

        ctl.submit(
            "make it fluffier",
            Some("Zm9v".to_string()),
            MessageType::ImageToImage,
        )
        .await;

        let image_calls = gateway.image_calls.lock().unwrap();
        assert_eq!(image_calls[0].source_image.as_deref(), Some("Zm9v"));
        assert_eq!(ctl.messages()[1].message_type, MessageType::ImageToImage);
    }

    #[tokio::test]
    async fn gateway_error_field_is_displayed_verbatim() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::new(MockOutcome::Body {
            primary: None,
            error: Some("quota exhausted"),
        });
        let mut ctl = controller(store, gateway);

        ctl.submit("hi", None, MessageType::Text).await;

        assert_eq!(ctl.messages()[1].content, "quota exhausted");
        assert!(!ctl.is_loading());
    }

    #[tokio::test]
    async fn empty_body_falls_back_to_fixed_strings() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::new(MockOutcome::Body {
            primary: Some(""),
            error: None,
        });
        let mut ctl = controller(store, gateway.clone());

        ctl.submit("hi", None, MessageType::Text).await;
        assert_eq!(ctl.messages()[1].content, CHAT_EMPTY_FALLBACK);

        ctl.submit("a cat", None, MessageType::Image).await;
        assert_eq!(ctl.messages()[3].content, IMAGE_EMPTY_FALLBACK);
    }

    #[tokio::test]
    async fn transport_failure_synthesizes_placeholder() {
        let store = Arc::new(MemoryStore::default());
        let gateway = MockGateway::new(MockOutcome::Fail);
        let mut ctl = controller(store.clone(), gateway);

        ctl.submit("a cat", None, MessageType::Image).await;

        let messages = ctl.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, TRANSPORT_FALLBACK);
        // The placeholder is a plain text message even on the image path.
        assert_eq!(messages[1].message_type, MessageType::Text);
        assert!(!ctl.is_loading());
        assert_eq!(store.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_roll_back_the_session() {
        let store = Arc::new(MemoryStore {
            fail_inserts: true,
            ..MemoryStore::default()
        });
        let gateway = MockGateway::replying("hello back");
        let mut ctl = controller(store.clone(), gateway);

        ctl.submit("hi", None, MessageType::Text).await;

        assert_eq!(ctl.messages().len(), 2);
        assert!(!ctl.is_loading());
        assert!(store.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_history_replaces_state_wholesale() {
        let store = Arc::new(MemoryStore::default());
        store
            .insert(&Message::user("old".to_string(), None, MessageType::Text))
            .await
            .unwrap();
        store
            .insert(&Message::assistant("reply".to_string(), MessageType::Text))
            .await
            .unwrap();

        let gateway = MockGateway::replying("unused");
        let mut ctl = controller(store, gateway);
        ctl.load_history().await;

        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(ctl.messages()[0].content, "old");
        assert_eq!(ctl.messages()[1].content, "reply");
    }
}
