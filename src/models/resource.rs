use serde::{Deserialize, Serialize};
use validator::Validate;

/// A content repository that owns courses and vocabularies
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Repository {
    /// Unique identifier
    pub id: i64,

    /// URL-safe name used to scope queries
    #[validate(length(min = 1, max = 100))]
    pub slug: String,

    /// Human-readable name
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

/// A course imported into a repository
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Course {
    /// Unique identifier
    pub id: i64,

    /// Owning repository
    pub repository_id: i64,

    /// Organisation (e.g. "MITx")
    #[validate(length(min = 1, max = 300))]
    pub org: String,

    /// Course number (e.g. "6.002x")
    #[validate(length(min = 1, max = 300))]
    pub course_number: String,

    /// Course run (e.g. "2015_T1")
    #[validate(length(min = 1, max = 300))]
    pub run: String,
}

/// One educational content item (chapter, video, problem, ...)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Resource {
    /// Unique identifier
    pub id: i64,

    /// Course this resource was imported from
    pub course_id: i64,

    /// Resource type name (e.g. "chapter", "problem")
    #[validate(length(min = 1, max = 100))]
    pub resource_type: String,

    /// Title, may be blank
    #[serde(default)]
    pub title: String,

    /// Plain description
    #[serde(default)]
    pub description: String,

    /// Breadcrumb of ancestor titles
    #[serde(default)]
    pub description_path: String,

    /// Raw OLX markup
    #[serde(default)]
    pub content_xml: String,

    /// OLX url_name, used to build the preview link
    #[serde(default)]
    pub url_name: Option<String>,

    /// Analytics: number of views
    #[serde(default)]
    #[validate(range(min = 0))]
    pub xa_nr_views: i64,

    /// Analytics: number of attempts
    #[serde(default)]
    #[validate(range(min = 0))]
    pub xa_nr_attempts: i64,

    /// Analytics: average grade
    #[serde(default)]
    pub xa_avg_grade: f64,

    /// Analytics: grade histogram summary
    #[serde(default)]
    pub xa_histogram_grade: f64,

    /// Assigned taxonomy term ids
    #[serde(default)]
    pub term_ids: Vec<i64>,
}

impl Resource {
    /// Create a resource with empty content and zeroed statistics
    pub fn new(id: i64, course_id: i64, resource_type: &str, title: &str) -> Self {
        Self {
            id,
            course_id,
            resource_type: resource_type.to_string(),
            title: title.to_string(),
            description: String::new(),
            description_path: String::new(),
            content_xml: String::new(),
            url_name: None,
            xa_nr_views: 0,
            xa_nr_attempts: 0,
            xa_avg_grade: 0.0,
            xa_histogram_grade: 0.0,
            term_ids: Vec::new(),
        }
    }

    /// Set the raw markup content
    pub fn with_content(mut self, content_xml: &str) -> Self {
        self.content_xml = content_xml.to_string();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Set view/attempt counts
    pub fn with_stats(mut self, views: i64, attempts: i64, avg_grade: f64) -> Self {
        self.xa_nr_views = views;
        self.xa_nr_attempts = attempts;
        self.xa_avg_grade = avg_grade;
        self
    }

    /// Assign taxonomy terms
    pub fn with_terms(mut self, term_ids: Vec<i64>) -> Self {
        self.term_ids = term_ids;
        self
    }
}
