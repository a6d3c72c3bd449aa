//! Search document structures and indexing

use crate::models::Resource;
use crate::search::error::{SearchError, SearchResult};
use crate::search::facet::{BuiltinFacet, FacetKey};
use crate::search::metadata::{CourseMetadata, VocabularyTerms};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tantivy::schema::*;
use tantivy::TantivyDocument;
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Hierarchical facet field carrying every facet path of a document
pub const FACETS_FIELD: &str = "facets";

/// `titlesort` value for blank titles; sorts after every `0`-prefixed title
pub const BLANK_TITLE_SORT: &str = "1";

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static CDATA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]*>").unwrap());

/// Trait for documents that can be indexed and searched
pub trait SearchDocument {
    /// Convert to Tantivy document
    fn to_tantivy_doc(&self, schema: &Schema) -> TantivyDocument;

    /// Get document ID
    fn document_id(&self) -> i64;
}

/// Flattened projection of a resource written to the index.
///
/// Always written whole; an update replaces the previous document with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub id: i64,
    pub title: String,
    pub titlesort: String,
    pub description: String,
    pub description_path: String,
    pub content_xml: String,
    pub content_stripped: String,
    pub resource_type: String,
    pub run: String,
    pub course: String,
    pub repository: String,
    pub preview_url: String,
    pub xa_nr_views: i64,
    pub xa_nr_attempts: i64,
    pub xa_avg_grade: f64,
    pub xa_histogram_grade: f64,

    /// Term ids per vocabulary key, e.g. `vocab_7: [70, 71]`
    #[serde(flatten)]
    pub vocabularies: BTreeMap<FacetKey, Vec<i64>>,
}

impl ResourceDocument {
    /// Canonical JSON form, stable for equal inputs
    pub fn to_json(&self) -> SearchResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Vocabulary ids this document writes a field for
    pub fn vocabulary_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.vocabularies.keys().filter_map(|key| key.vocabulary_id())
    }

    fn builtin_value(&self, facet: BuiltinFacet) -> &str {
        match facet {
            BuiltinFacet::Course => &self.course,
            BuiltinFacet::Run => &self.run,
            BuiltinFacet::ResourceType => &self.resource_type,
        }
    }
}

impl SearchDocument for ResourceDocument {
    fn to_tantivy_doc(&self, schema: &Schema) -> TantivyDocument {
        let mut doc = TantivyDocument::new();

        let text_fields: [(&str, &str); 11] = [
            ("title", &self.title),
            ("titlesort", &self.titlesort),
            ("description", &self.description),
            ("description_path", &self.description_path),
            ("content_xml", &self.content_xml),
            ("content_stripped", &self.content_stripped),
            ("resource_type", &self.resource_type),
            ("run", &self.run),
            ("course", &self.course),
            ("repository", &self.repository),
            ("preview_url", &self.preview_url),
        ];

        if let Ok(field) = schema.get_field("id") {
            doc.add_i64(field, self.id);
        }

        for (name, value) in text_fields {
            if let Ok(field) = schema.get_field(name) {
                doc.add_text(field, value);
            }
        }

        if let Ok(field) = schema.get_field("xa_nr_views") {
            doc.add_i64(field, self.xa_nr_views);
        }
        if let Ok(field) = schema.get_field("xa_nr_attempts") {
            doc.add_i64(field, self.xa_nr_attempts);
        }
        if let Ok(field) = schema.get_field("xa_avg_grade") {
            doc.add_f64(field, self.xa_avg_grade);
        }
        if let Ok(field) = schema.get_field("xa_histogram_grade") {
            doc.add_f64(field, self.xa_histogram_grade);
        }

        // Facets: /run/<v>, /course/<v>, /resource_type/<v>, /vocab_<id>/<term>
        if let Ok(field) = schema.get_field(FACETS_FIELD) {
            for facet in BuiltinFacet::ALL {
                let value = self.builtin_value(facet);
                if !value.is_empty() {
                    doc.add_facet(field, Facet::from_path([facet.field_name(), value]));
                }
            }
            for (key, term_ids) in &self.vocabularies {
                let name = key.field_name();
                for term_id in term_ids {
                    doc.add_facet(field, Facet::from_path([name.clone(), term_id.to_string()]));
                }
            }
        }

        doc
    }

    fn document_id(&self) -> i64 {
        self.id
    }
}

/// Builds index documents from resources
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    preview_base_url: String,
}

impl DocumentBuilder {
    pub fn new(preview_base_url: impl Into<String>) -> Self {
        Self {
            preview_base_url: preview_base_url.into(),
        }
    }

    /// Build the document for one resource.
    ///
    /// Deterministic: the same resource, course and term map always produce an
    /// identical document.
    pub fn build(
        &self,
        resource: &Resource,
        course: &CourseMetadata,
        terms: &VocabularyTerms,
    ) -> ResourceDocument {
        let content_xml = normalize_text(&resource.content_xml);
        let content_stripped = match strip_markup(&content_xml) {
            Ok(stripped) => stripped,
            Err(e) => {
                tracing::warn!(resource_id = resource.id, error = %e, "Indexing raw content");
                content_xml.clone()
            }
        };

        let vocabularies = terms
            .iter()
            .map(|(vocabulary_id, term_ids)| {
                let mut term_ids = term_ids.clone();
                term_ids.sort_unstable();
                term_ids.dedup();
                (FacetKey::vocabulary(*vocabulary_id), term_ids)
            })
            .collect();

        ResourceDocument {
            id: resource.id,
            title: normalize_text(&resource.title),
            titlesort: titlesort(&resource.title),
            description: normalize_text(&resource.description),
            description_path: normalize_text(&resource.description_path),
            content_xml,
            content_stripped,
            resource_type: normalize_text(&resource.resource_type),
            run: normalize_text(&course.run),
            course: normalize_text(&course.course_number),
            repository: course.repository.clone(),
            preview_url: self.preview_url(resource, course),
            xa_nr_views: resource.xa_nr_views,
            xa_nr_attempts: resource.xa_nr_attempts,
            xa_avg_grade: resource.xa_avg_grade,
            xa_histogram_grade: resource.xa_histogram_grade,
            vocabularies,
        }
    }

    /// LMS "jump to" link, empty when the resource has no url_name
    fn preview_url(&self, resource: &Resource, course: &CourseMetadata) -> String {
        let Some(ref url_name) = resource.url_name else {
            return String::new();
        };
        let base = self.preview_base_url.trim_end_matches('/');
        format!(
            "{}/courses/{}/{}/{}/jump_to_id/{}",
            base, course.org, course.course_number, course.run, url_name
        )
    }
}

/// Sort key for titles: blank titles sink below every real title
pub fn titlesort(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        BLANK_TITLE_SORT.to_string()
    } else {
        format!("0{}", normalize_text(trimmed))
    }
}

/// NFC-normalize text, leaving already-normalized input untouched
pub fn normalize_text(value: &str) -> String {
    if is_nfc(value) {
        value.to_string()
    } else {
        value.nfc().collect()
    }
}

/// Remove markup tags and decode entities, collapsing whitespace.
///
/// Returns `MalformedContent` when a tag is left unterminated.
pub fn strip_markup(content: &str) -> SearchResult<String> {
    let without_comments = COMMENT_RE.replace_all(content, " ");
    let without_cdata = CDATA_RE.replace_all(&without_comments, |caps: &Captures| {
        format!(" {} ", html_escape::encode_text(&caps[1]))
    });
    let without_tags = TAG_RE.replace_all(&without_cdata, " ");

    if let Some(position) = without_tags.find('<') {
        return Err(SearchError::MalformedContent(format!(
            "unterminated tag near byte {}",
            position
        )));
    }

    let decoded = html_escape::decode_html_entities(&without_tags);
    Ok(decoded.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Build the search schema for resources
pub fn build_resource_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    // ID - exact, stored, fast (sort tiebreaker)
    schema_builder.add_i64_field("id", INDEXED | STORED | FAST);

    // Analyzed text
    schema_builder.add_text_field("title", TEXT | STORED);
    schema_builder.add_text_field("description", TEXT | STORED);
    schema_builder.add_text_field("content_stripped", TEXT | STORED);

    // Exact text
    schema_builder.add_text_field("titlesort", STRING | STORED | FAST);
    schema_builder.add_text_field("resource_type", STRING | STORED);
    schema_builder.add_text_field("run", STRING | STORED);
    schema_builder.add_text_field("course", STRING | STORED);
    schema_builder.add_text_field("repository", STRING | STORED);

    // Stored only
    schema_builder.add_text_field("description_path", STORED);
    schema_builder.add_text_field("content_xml", STORED);
    schema_builder.add_text_field("preview_url", STORED);

    // Analytics
    schema_builder.add_i64_field("xa_nr_views", INDEXED | STORED | FAST);
    schema_builder.add_i64_field("xa_nr_attempts", INDEXED | STORED | FAST);
    schema_builder.add_f64_field("xa_avg_grade", INDEXED | STORED | FAST);
    schema_builder.add_f64_field("xa_histogram_grade", INDEXED | STORED | FAST);

    // Built-in and vocabulary facets
    schema_builder.add_facet_field(FACETS_FIELD, FacetOptions::default());

    schema_builder.build()
}
