//! Tantivy-based search index module.
//!
//! Full-text search over classrooms, assignments and students with field boosting.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Assignment, Classroom, Student};

const BOOST_TITLE: f32 = 10.0;
const BOOST_DESCRIPTION: f32 = 5.0;

/// Kind of entity a search hit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Classroom,
    Assignment,
    Student,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Classroom => "classroom",
            SearchKind::Assignment => "assignment",
            SearchKind::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "classroom" => Some(SearchKind::Classroom),
            "assignment" => Some(SearchKind::Assignment),
            "student" => Some(SearchKind::Student),
            _ => None,
        }
    }
}

/// Search result with entity reference and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entity_id: String,
    pub kind: SearchKind,
    pub score: f32,
}

/// Text extracted from an entity for indexing.
pub struct SearchEntry {
    pub entity_id: String,
    pub kind: SearchKind,
    pub title: String,
    pub description: String,
}

impl From<&Classroom> for SearchEntry {
    fn from(classroom: &Classroom) -> Self {
        Self {
            entity_id: classroom.id.clone(),
            kind: SearchKind::Classroom,
            title: classroom.title.clone(),
            description: format!(
                "{} {}",
                classroom.description,
                classroom.organization.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl From<&Assignment> for SearchEntry {
    fn from(assignment: &Assignment) -> Self {
        Self {
            entity_id: assignment.id.clone(),
            kind: SearchKind::Assignment,
            title: assignment.title.clone(),
            description: assignment.description.clone(),
        }
    }
}

impl From<&Student> for SearchEntry {
    fn from(student: &Student) -> Self {
        Self {
            entity_id: student.id.clone(),
            kind: SearchKind::Student,
            title: student.username.clone(),
            description: format!(
                "{} {} {}",
                student.first_name,
                student.last_name,
                student.student_number.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Search index schema fields.
struct SearchFields {
    entity_id: Field,
    kind: Field,
    title: Field,
    description: Field,
}

/// Tantivy search index for classroom entities.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let entity_id = schema_builder.add_text_field("entity_id", STRING | STORED);
        let kind = schema_builder.add_text_field("kind", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let description = schema_builder.add_text_field("description", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            entity_id,
            kind,
            title,
            description,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the given entries.
    pub async fn rebuild(&self, entries: &[SearchEntry]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for entry in entries {
            writer.add_document(self.create_document(entry))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} entries", entries.len());
        Ok(())
    }

    /// Index or re-index a single entity.
    pub async fn index(&self, entry: SearchEntry) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.entity_id, &entry.entity_id));
        writer.add_document(self.create_document(&entry))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Remove an entity from the index.
    pub async fn remove(&self, entity_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.entity_id, entity_id));
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search for entities matching the query, optionally restricted to one kind.
    pub fn search(
        &self,
        query_str: &str,
        kind: Option<SearchKind>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        // Surface syntax errors before building the boosted per-field queries.
        QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.description])
            .parse_query(query_str)
            .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?;

        let mut text_queries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in [
            (self.fields.title, BOOST_TITLE),
            (self.fields.description, BOOST_DESCRIPTION),
        ] {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                text_queries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Must, Box::new(BooleanQuery::new(text_queries)))];
        if let Some(kind) = kind {
            let term = Term::from_field_text(self.fields.kind, kind.as_str());
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }
        let query = BooleanQuery::new(clauses);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let entity_id = doc.get_first(self.fields.entity_id)?.as_str()?.to_string();
                let kind = SearchKind::parse(doc.get_first(self.fields.kind)?.as_str()?)?;
                Some(SearchResult {
                    entity_id,
                    kind,
                    score,
                })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, entry: &SearchEntry) -> TantivyDocument {
        doc!(
            self.fields.entity_id => entry.entity_id.clone(),
            self.fields.kind => entry.kind.as_str(),
            self.fields.title => entry.title.clone(),
            self.fields.description => entry.description.clone()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str, kind: SearchKind, title: &str, description: &str) -> SearchEntry {
        SearchEntry {
            entity_id: id.to_string(),
            kind,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_by_title_and_kind() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        index
            .rebuild(&[
                entry("c1", SearchKind::Classroom, "Operating Systems", "kernels"),
                entry("a1", SearchKind::Assignment, "Systems Lab", "write a shell"),
                entry("s1", SearchKind::Student, "alice", "Alice Smith"),
            ])
            .await
            .unwrap();

        let results = index.search("systems", None, 10, 0).unwrap();
        assert_eq!(results.len(), 2);

        let results = index
            .search("systems", Some(SearchKind::Assignment), 10, 0)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id, "a1");
        assert_eq!(results[0].kind, SearchKind::Assignment);
    }

    #[tokio::test]
    async fn test_reindex_replaces_and_remove_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        index
            .index(entry("c1", SearchKind::Classroom, "Compilers", ""))
            .await
            .unwrap();
        index
            .index(entry("c1", SearchKind::Classroom, "Databases", ""))
            .await
            .unwrap();

        assert!(index.search("compilers", None, 10, 0).unwrap().is_empty());
        assert_eq!(index.search("databases", None, 10, 0).unwrap().len(), 1);

        index.remove("c1").await.unwrap();
        assert!(index.search("databases", None, 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let results = index.search("", None, 10, 0).unwrap();
        assert!(results.is_empty());
    }
}
