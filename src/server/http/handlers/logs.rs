use crate::api::request::TailQuery;
use crate::server::state::AppState;
use crate::utils::tail_lines;
use crate::Result;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::path::Path;

/// 以纯文本返回文件末尾若干行；文件不存在时返回空文本
pub(crate) async fn plain_text_tail(path: Option<&Path>, lines: usize) -> Result<Response> {
    let body = match path {
        Some(path) => tail_lines(path, lines).await?.unwrap_or_default(),
        None => String::new(),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response())
}

/// 应用日志
pub async fn logs(State(state): State<AppState>, Query(query): Query<TailQuery>) -> Result<Response> {
    plain_text_tail(state.app_log.as_deref(), query.lines()).await
}
