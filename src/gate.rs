//! 请求闸门
//!
//! 用处理链实现的请求准入判断：黑名单 → 403，缺少密钥 → 401，
//! 路由表命中 → 转发上游。所有候选者都未处理时兜底为 404。

use anyhow::{bail, Result};
use async_trait::async_trait;
use relaycast_processor::handler::{self, Candidate, HandlerChainBuilder, HandlerState};
use relaycast_processor::{handled, not_handled, HandlerOutcome, PipelineError, Step, Traced};
use std::fmt;
use std::sync::Arc;
use tracing::{Level, Span};

/// 进入闸门的请求
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub method: String,
    pub path: String,
    pub api_key: Option<String>,
    span: Span,
}

impl GateRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, api_key: Option<String>) -> Self {
        let method = method.into().to_ascii_uppercase();
        let path = path.into();
        let span = tracing::info_span!("gate", method = %method, path = %path);
        Self {
            method,
            path,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            span,
        }
    }

    /// 解析 `METHOD PATH [api-key]`
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            bail!("请求格式应为 `METHOD PATH [api-key]`: {line:?}");
        };
        if !path.starts_with('/') {
            bail!("路径必须以 / 开头: {path}");
        }
        let api_key = parts.next().map(str::to_string);
        if parts.next().is_some() {
            bail!("多余的请求字段: {line:?}");
        }
        Ok(Self::new(method, path, api_key))
    }
}

impl Traced for GateRequest {
    fn span(&self) -> &Span {
        &self.span
    }
}

/// 闸门判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Forward { upstream: String },
    Reject { status: u16, reason: String },
}

impl GateDecision {
    pub fn reject(status: u16, reason: impl Into<String>) -> Self {
        GateDecision::Reject {
            status,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            GateDecision::Forward { .. } => 200,
            GateDecision::Reject { status, .. } => *status,
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDecision::Forward { upstream } => write!(f, "forward -> {upstream}"),
            GateDecision::Reject { status, reason } => write!(f, "reject {status}: {reason}"),
        }
    }
}

/// 闸门规则
#[derive(Debug, Clone)]
pub struct GateRules {
    /// 被拒绝的路径前缀
    pub blocked_prefixes: Vec<String>,
    /// 无需密钥的路径前缀
    pub public_prefixes: Vec<String>,
    /// `(路径前缀, 上游地址)`，按顺序匹配
    pub routes: Vec<(String, String)>,
}

impl Default for GateRules {
    fn default() -> Self {
        Self {
            blocked_prefixes: vec!["/admin".to_string(), "/internal".to_string()],
            public_prefixes: vec!["/health".to_string()],
            routes: vec![
                ("/health".to_string(), "local://health".to_string()),
                ("/v1/chat".to_string(), "http://127.0.0.1:9001".to_string()),
                ("/v1/".to_string(), "http://127.0.0.1:9000".to_string()),
            ],
        }
    }
}

/// 路由表候选者
struct RouteTable {
    routes: Vec<(String, String)>,
}

#[async_trait]
impl Candidate<GateRequest, GateDecision> for RouteTable {
    async fn handle(&self, request: Arc<GateRequest>) -> HandlerOutcome<GateDecision> {
        match self
            .routes
            .iter()
            .find(|(prefix, _)| request.path.starts_with(prefix.as_str()))
        {
            Some((_, upstream)) => handled(GateDecision::Forward {
                upstream: upstream.clone(),
            }),
            None => not_handled(),
        }
    }

    fn name(&self) -> &str {
        "routing"
    }
}

type GateChain = Step<HandlerState<GateRequest, GateDecision>, HandlerState<GateRequest, GateDecision>>;

/// 请求闸门
#[derive(Clone)]
pub struct Gate {
    chain: GateChain,
}

impl Gate {
    /// `step_logging` 为 `Some(level)` 时每个候选者的进出都会记录日志
    pub fn new(rules: GateRules, step_logging: Option<Level>) -> Result<Self, PipelineError> {
        let GateRules {
            blocked_prefixes,
            public_prefixes,
            routes,
        } = rules;

        let builder = HandlerChainBuilder::new("gate")
            .candidate_fn("blocklist", move |request: &GateRequest| {
                if blocked_prefixes
                    .iter()
                    .any(|prefix| request.path.starts_with(prefix.as_str()))
                {
                    handled(GateDecision::reject(403, "路径已被禁止"))
                } else {
                    not_handled()
                }
            })
            .candidate_fn("api_key", move |request: &GateRequest| {
                let public = public_prefixes
                    .iter()
                    .any(|prefix| request.path.starts_with(prefix.as_str()));
                if public || request.api_key.is_some() {
                    not_handled()
                } else {
                    handled(GateDecision::reject(401, "缺少 API 密钥"))
                }
            })
            .candidate(Arc::new(RouteTable { routes }));

        let chain = match step_logging {
            Some(level) => builder.build_with_step_logging(level)?,
            None => builder.build()?,
        };
        Ok(Self { chain })
    }

    /// 判定请求，未被任何候选者处理时返回 404
    pub async fn decide(&self, request: GateRequest) -> GateDecision {
        let span = request.span.clone();
        let decision = handler::run(&self.chain, request)
            .await
            .unwrap_or_else(|| GateDecision::reject(404, "没有匹配的路由"));
        span.in_scope(|| tracing::info!("[GATE] {}", decision));
        decision
    }
}
