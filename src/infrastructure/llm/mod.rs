//! LLM service client and block invocation

pub mod http_client;
mod invoker;
mod openai;

pub use http_client::{is_transient_status, HttpClient, HttpClientTrait};
pub use invoker::{parse_output, strip_code_fence, Invocation, LlmInvoker, LlmInvokerConfig};
pub use openai::{OpenAiProvider, DEFAULT_OPENAI_BASE_URL};
