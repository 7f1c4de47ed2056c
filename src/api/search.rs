//! Search API endpoints.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{Assignment, Classroom, Student};
use crate::search::SearchKind;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Restrict hits to `classroom`, `assignment` or `student`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Search results and paging metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// The entity a hit resolved to.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchHit {
    Classroom(Classroom),
    Assignment(Assignment),
    Student(Student),
}

/// Single search result item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub kind: SearchKind,
    pub entity: SearchHit,
    pub score: f32,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /api/search - Search classrooms, assignments and students.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let kind = match params.kind.as_deref() {
        None | Some("") => None,
        Some(raw) => match SearchKind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                return error(
                    AppError::BadRequest(format!("Unknown search kind: {}", raw)),
                    revision_id,
                )
            }
        },
    };

    let limit = params.limit.min(MAX_SEARCH_LIMIT);

    let search_results = match state.search.search(&params.q, kind, limit, params.offset) {
        Ok(results) => results,
        Err(e) => return error(e, revision_id),
    };

    // Hits whose row vanished since indexing are dropped.
    let mut results = Vec::new();
    for sr in search_results {
        let entity = match sr.kind {
            SearchKind::Classroom => state
                .repo
                .get_classroom(&sr.entity_id)
                .await
                .ok()
                .flatten()
                .map(SearchHit::Classroom),
            SearchKind::Assignment => state
                .repo
                .get_assignment(&sr.entity_id)
                .await
                .ok()
                .flatten()
                .map(SearchHit::Assignment),
            SearchKind::Student => state
                .repo
                .get_student(&sr.entity_id)
                .await
                .ok()
                .flatten()
                .map(SearchHit::Student),
        };
        if let Some(entity) = entity {
            results.push(SearchResultItem {
                kind: sr.kind,
                entity,
                score: sr.score,
            });
        }
    }

    let total = results.len();

    success(
        SearchResponse {
            results,
            total,
            limit,
            offset: params.offset,
        },
        revision_id,
    )
}
