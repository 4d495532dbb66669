use super::hydrate::EntityRow;
use crate::error::{RelqlError, Result};
use async_graphql::Value;

/// A client's `paginationRequest`, page 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    /// `None` leaves the page unbounded
    pub size: Option<u64>,
}

impl PageRequest {
    pub fn new(page: i64, size: Option<i64>) -> Result<Self> {
        if page < 1 {
            return Err(RelqlError::Pagination(format!(
                "page must be at least 1, got {}",
                page
            )));
        }
        if let Some(size) = size {
            if size < 1 {
                return Err(RelqlError::Pagination(format!(
                    "size must be at least 1, got {}",
                    size
                )));
            }
        }
        Ok(Self {
            page: page as u64,
            size: size.map(|size| size as u64),
        })
    }

    /// Parse a `PaginationObject` argument value
    pub fn from_argument(value: Option<&Value>) -> Result<Option<Self>> {
        let fields = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                return Err(RelqlError::Pagination(format!(
                    "paginationRequest must be an object, got {}",
                    other
                )))
            }
        };

        let read = |name: &str| -> Result<Option<i64>> {
            match fields.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Number(number)) => number.as_i64().map(Some).ok_or_else(|| {
                    RelqlError::Pagination(format!("{} must be an integer, got {}", name, number))
                }),
                Some(other) => Err(RelqlError::Pagination(format!(
                    "{} must be an integer, got {}",
                    name, other
                ))),
            }
        };

        let page = read("page")?.unwrap_or(1);
        let size = read("size")?;
        Self::new(page, size).map(Some)
    }

    pub fn offset(&self) -> u64 {
        match self.size {
            Some(size) => (self.page - 1) * size,
            None => 0,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.size
    }
}

pub fn total_pages(total_elements: u64, size: Option<u64>) -> u64 {
    match size {
        Some(size) if size > 0 => total_elements.div_ceil(size),
        _ => u64::from(total_elements > 0),
    }
}

/// The row and relationship a nested connection was opened from
#[derive(Debug, Clone)]
pub struct ParentLink {
    /// Entity declaring the relationship
    pub entity: String,
    /// Originating relationship field
    pub attribute: String,
    pub row: EntityRow,
}

/// Binds one page of a connection to its source
#[derive(Debug, Clone)]
pub struct PaginationEnvelope {
    /// Entity the connection pages over
    pub entity: String,
    pub total_elements: u64,
    pub total_pages: u64,
    pub page_size: Option<u64>,
    pub page: u64,
    pub parent: Option<ParentLink>,
}

impl PaginationEnvelope {
    pub fn new(
        entity: impl Into<String>,
        request: Option<PageRequest>,
        total_elements: u64,
        parent: Option<ParentLink>,
    ) -> Self {
        let page_size = request.and_then(|r| r.size);
        Self {
            entity: entity.into(),
            total_elements,
            total_pages: total_pages(total_elements, page_size),
            page_size,
            page: request.map(|r| r.page).unwrap_or(1),
            parent,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        self.page_size.map(|size| (self.page - 1) * size).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(page: i64, size: i64) -> Value {
        Value::from_json(serde_json::json!({ "page": page, "size": size })).unwrap()
    }

    #[test]
    fn test_page_arithmetic() {
        let page = PageRequest::from_argument(Some(&request(2, 20))).unwrap().unwrap();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), Some(20));
        assert_eq!(total_pages(101, Some(20)), 6);
        assert_eq!(total_pages(100, Some(20)), 5);
        assert_eq!(total_pages(0, Some(20)), 0);
    }

    #[test]
    fn test_invalid_page_is_rejected() {
        assert!(matches!(
            PageRequest::from_argument(Some(&request(0, 20))),
            Err(RelqlError::Pagination(_))
        ));
        assert!(matches!(
            PageRequest::from_argument(Some(&request(1, 0))),
            Err(RelqlError::Pagination(_))
        ));
    }

    #[test]
    fn test_missing_request_is_one_page() {
        assert_eq!(PageRequest::from_argument(None).unwrap(), None);

        let envelope = PaginationEnvelope::new("Book", None, 7, None);
        assert_eq!(envelope.page, 1);
        assert_eq!(envelope.total_pages, 1);
        assert_eq!(envelope.limit(), None);
        assert_eq!(envelope.offset(), 0);

        assert_eq!(PaginationEnvelope::new("Book", None, 0, None).total_pages, 0);
    }

    #[test]
    fn test_envelope_window() {
        let page = PageRequest::new(3, Some(5)).unwrap();
        let envelope = PaginationEnvelope::new("Book", Some(page), 12, None);
        assert_eq!(envelope.total_pages, 3);
        assert_eq!(envelope.offset(), 10);
        assert_eq!(envelope.limit(), Some(5));
    }
}
