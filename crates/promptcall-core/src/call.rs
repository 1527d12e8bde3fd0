//! Prompt calls
//!
//! A [`Call`] pairs a prompt (a template or a pre-built message list) with a
//! provider and call parameters. Each invocation compiles the prompt once,
//! synchronously, and only then talks to the provider.

use crate::{CallResponse, Error, Result, RetryPolicy, structured};
use promptcall_llm::{
    ChunkStream, CompletionRequest, LLMProvider, Message, ResponseFormat, ToolDefinition,
};
use promptcall_prompt::{Bindings, PromptTemplate};
use promptcall_utils::Config;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
enum Prompt {
    Template(PromptTemplate),
    Messages(Vec<Message>),
}

/// A prompt bound to a provider and call parameters
///
/// # Examples
///
/// ```no_run
/// use promptcall_core::{Call, PromptTemplate, Bindings};
/// use promptcall_llm::providers::OpenAIProvider;
/// use std::sync::Arc;
///
/// # async fn run() -> promptcall_core::Result<()> {
/// let provider = Arc::new(OpenAIProvider::from_env()?);
/// let recommend = Call::new(provider, "gpt-4o-mini")
///     .template(PromptTemplate::new("Recommend a {genre} book.")?)
///     .max_tokens(256);
///
/// let response = recommend.invoke(&Bindings::new().with("genre", "fantasy")).await?;
/// println!("{}", response.content());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Call {
    provider: Arc<dyn LLMProvider>,
    model: String,
    prompt: Prompt,
    system: Option<String>,
    max_tokens: usize,
    temperature: Option<f32>,
    top_p: Option<f32>,
    stop_sequences: Option<Vec<String>>,
    tools: Option<Vec<ToolDefinition>>,
    json_mode: bool,
    retry: RetryPolicy,
}

impl Call {
    /// Create a call with an empty prompt and default parameters
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            prompt: Prompt::Messages(Vec::new()),
            system: None,
            max_tokens: 1024,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            tools: None,
            json_mode: false,
            retry: RetryPolicy::no_retry(),
        }
    }

    /// Create a call using the configured default model and parameters
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &Config) -> Result<Self> {
        let model = config.default_model.clone().ok_or_else(|| {
            Error::Configuration("no model given and no default model configured".to_string())
        })?;
        Ok(Self::new(provider, model).with_config(config))
    }

    /// Apply default parameters from configuration
    pub fn with_config(mut self, config: &Config) -> Self {
        self.max_tokens = config.max_tokens;
        if config.temperature.is_some() {
            self.temperature = config.temperature;
        }
        self.retry = RetryPolicy::from(config);
        self
    }

    /// Use a template as the prompt
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.prompt = Prompt::Template(template);
        self
    }

    /// Use a pre-built message list as the prompt, bypassing templating
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.prompt = Prompt::Messages(messages);
        self
    }

    /// System prompt placed ahead of any system messages from the template
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(sequences);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Ask the provider for a JSON object reply
    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Compile the prompt against `bindings`
    pub fn compile(&self, bindings: &Bindings) -> Result<Vec<Message>> {
        match &self.prompt {
            Prompt::Template(template) => Ok(template.messages(bindings)?),
            Prompt::Messages(messages) => Ok(messages.clone()),
        }
    }

    /// Build the provider request for `bindings`
    pub fn request(&self, bindings: &Bindings) -> Result<CompletionRequest> {
        let format = self.json_mode.then_some(ResponseFormat::Json);
        self.build_request(self.compile(bindings)?, format)
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        response_format: Option<ResponseFormat>,
    ) -> Result<CompletionRequest> {
        if messages.is_empty() && self.system.is_none() {
            return Err(Error::Configuration(
                "the prompt compiled to no messages".to_string(),
            ));
        }
        Ok(CompletionRequest {
            model: self.model.clone(),
            messages,
            system: self.system.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            tools: self.tools.clone(),
            stop_sequences: self.stop_sequences.clone(),
            response_format,
        })
    }

    /// Run the call and return the provider's reply
    #[instrument(skip(self, bindings), fields(model = %self.model))]
    pub async fn invoke(&self, bindings: &Bindings) -> Result<CallResponse> {
        let request = self.request(bindings)?;
        let response = self
            .retry
            .execute("invoke", || {
                let request = request.clone();
                async move { Ok(self.provider.complete(request).await?) }
            })
            .await?;

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Call completed"
        );
        Ok(CallResponse::new(response, request.messages))
    }

    /// Run the call and stream the reply
    ///
    /// Retries cover opening the stream only.
    #[instrument(skip(self, bindings), fields(model = %self.model))]
    pub async fn stream(&self, bindings: &Bindings) -> Result<ChunkStream> {
        let request = self.request(bindings)?;
        self.retry
            .execute("stream", || {
                let request = request.clone();
                async move { Ok(self.provider.stream(request).await?) }
            })
            .await
    }

    /// Run the call and parse the reply into `T`
    ///
    /// The provider is asked for JSON matching `T`'s schema. A reply that does
    /// not parse is an [`Error::SchemaValidation`], which the retry policy
    /// treats as retryable.
    #[instrument(skip(self, bindings), fields(model = %self.model))]
    pub async fn extract<T>(&self, bindings: &Bindings) -> Result<T>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema_name = T::schema_name();
        let request =
            self.build_request(self.compile(bindings)?, Some(structured::response_format::<T>()))?;

        self.retry
            .execute("extract", || {
                let request = request.clone();
                let schema_name = &schema_name;
                async move {
                    let response = self.provider.complete(request).await?;
                    structured::parse_json(&response.content(), schema_name)
                }
            })
            .await
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("prompt", &self.prompt)
            .field("max_tokens", &self.max_tokens)
            .field("json_mode", &self.json_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use mockall::mock;
    use promptcall_llm::{
        CompletionResponse, LLMError, ResponseChunk, Role, StopReason, TokenUsage,
    };
    use promptcall_prompt::PromptError;
    use serde::Deserialize;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    mock! {
        Provider {}

        #[async_trait]
        impl LLMProvider for Provider {
            async fn complete(&self, request: CompletionRequest) -> promptcall_llm::Result<promptcall_llm::CompletionResponse>;
            async fn stream(&self, request: CompletionRequest) -> promptcall_llm::Result<ChunkStream>;
            fn name(&self) -> &'static str;
        }
    }

    fn reply(text: &str) -> CompletionResponse {
        CompletionResponse {
            id: None,
            model: "mock-model".to_string(),
            message: Message::new(Role::Assistant, text),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 4,
            },
            raw: json!({}),
        }
    }

    fn book_call(provider: MockProvider) -> Call {
        Call::new(Arc::new(provider), "mock-model").template(
            PromptTemplate::new("SYSTEM: You are a librarian.\nUSER: Recommend a {genre} book.")
                .unwrap(),
        )
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Book {
        title: String,
        author: String,
    }

    #[tokio::test]
    async fn test_invoke_sends_compiled_messages() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(|request| {
                request.model == "mock-model"
                    && request.max_tokens == 256
                    && request.messages
                        == vec![
                            Message::system("You are a librarian."),
                            Message::user("Recommend a fantasy book."),
                        ]
                    && request.response_format.is_none()
            })
            .times(1)
            .returning(|_| Ok(reply("Mistborn")));

        let call = book_call(provider).max_tokens(256);
        let response = assert_ok!(call.invoke(&Bindings::new().with("genre", "fantasy")).await);

        assert_eq!(response.content(), "Mistborn");
        assert_eq!(response.usage().total(), 14);
        assert_eq!(response.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_binding_never_reaches_provider() {
        let mut provider = MockProvider::new();
        provider.expect_complete().never();

        let call = book_call(provider).with_retry(RetryPolicy::fast());
        let err = assert_err!(call.invoke(&Bindings::new()).await);
        assert!(matches!(
            err,
            Error::Prompt(PromptError::MissingVariable { path }) if path == "genre"
        ));
    }

    #[tokio::test]
    async fn test_prebuilt_messages_pass_through() {
        let history = vec![Message::user("Hi"), Message::assistant("Hello!")];
        let expected = history.clone();

        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(move |request| request.messages == expected)
            .returning(|_| Ok(reply("ok")));

        let call = Call::new(Arc::new(provider), "mock-model").messages(history);
        assert_ok!(call.invoke(&Bindings::new()).await);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let mut provider = MockProvider::new();
        provider.expect_complete().never();

        let call = Call::new(Arc::new(provider), "mock-model");
        assert!(matches!(
            call.invoke(&Bindings::new()).await,
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_errors_retried() {
        let mut provider = MockProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(LLMError::RateLimitExceeded("slow".to_string())));
        provider
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(reply("second time lucky")));

        let call = book_call(provider).with_retry(RetryPolicy::fast());
        let response = call
            .invoke(&Bindings::new().with("genre", "mystery"))
            .await
            .unwrap();
        assert_eq!(response.content(), "second time lucky");
    }

    #[tokio::test]
    async fn test_non_retryable_provider_error_surfaces() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_| Err(LLMError::AuthenticationFailed));

        let call = book_call(provider).with_retry(RetryPolicy::fast());
        let err = call
            .invoke(&Bindings::new().with("genre", "horror"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(LLMError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_json_mode_sets_format() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(|request| request.response_format == Some(ResponseFormat::Json))
            .returning(|_| Ok(reply("{}")));

        let call = book_call(provider).json_mode(true);
        assert_ok!(call.invoke(&Bindings::new().with("genre", "sci-fi")).await);
    }

    #[tokio::test]
    async fn test_extract_parses_schema_reply() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .withf(|request| {
                matches!(
                    &request.response_format,
                    Some(ResponseFormat::JsonSchema { name, .. }) if name == "Book"
                )
            })
            .returning(|_| {
                Ok(reply(
                    "```json\n{\"title\": \"The Name of the Wind\", \"author\": \"Patrick Rothfuss\"}\n```",
                ))
            });

        let book: Book = book_call(provider)
            .extract(&Bindings::new().with("genre", "fantasy"))
            .await
            .unwrap();
        assert_eq!(book.title, "The Name of the Wind");
        assert_eq!(book.author, "Patrick Rothfuss");
    }

    #[tokio::test]
    async fn test_extract_retries_schema_failures() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .times(3)
            .returning(|_| Ok(reply(r#"{"title": "Dune"}"#)));

        let err = book_call(provider)
            .with_retry(RetryPolicy::fast())
            .extract::<Book>(&Bindings::new().with("genre", "sci-fi"))
            .await
            .unwrap_err();

        match err {
            Error::SchemaValidation { schema, raw, .. } => {
                assert_eq!(schema, "Book");
                assert_eq!(raw, r#"{"title": "Dune"}"#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stream_yields_chunks() {
        let mut provider = MockProvider::new();
        provider.expect_stream().times(1).returning(|_| {
            let chunks = ["The ", "Hobbit"].map(|text| {
                Ok(ResponseChunk {
                    content: text.to_string(),
                    ..ResponseChunk::default()
                })
            });
            Ok(futures::stream::iter(chunks).boxed())
        });

        let stream = book_call(provider)
            .stream(&Bindings::new().with("genre", "fantasy"))
            .await
            .unwrap();
        let text: Vec<String> = stream.map(|chunk| chunk.unwrap().content).collect().await;
        assert_eq!(text.concat(), "The Hobbit");
    }

    #[test]
    fn test_with_config_applies_defaults() {
        let config = Config {
            default_model: Some("gpt-4o-mini".to_string()),
            max_tokens: 512,
            temperature: Some(0.3),
            max_retries: 4,
            ..Config::default()
        };
        let call = Call::from_config(Arc::new(MockProvider::new()), &config).unwrap();
        assert_eq!(call.model(), "gpt-4o-mini");

        let request = call.messages(vec![Message::user("hi")]).request(&Bindings::new()).unwrap();
        assert_eq!(request.max_tokens, 512);
        assert_eq!(request.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_config_retries_follow_first_attempt() {
        let mut provider = MockProvider::new();
        provider
            .expect_complete()
            .times(2)
            .returning(|_| Err(LLMError::RateLimitExceeded("slow".to_string())));

        let config = Config {
            default_model: Some("mock-model".to_string()),
            max_retries: 1,
            ..Config::default()
        };
        let call = Call::from_config(Arc::new(provider), &config)
            .unwrap()
            .messages(vec![Message::user("hi")]);
        assert_err!(call.invoke(&Bindings::new()).await);
    }

    #[test]
    fn test_from_config_requires_model() {
        let result = Call::from_config(Arc::new(MockProvider::new()), &Config::default());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
