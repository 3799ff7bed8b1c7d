//! Pagination over the most recent result request.
//!
//! The pager never mutates its page number on its own: transitions produce a
//! [`PageRequest`], and only [`ResultPager::commit`] after a successful fetch
//! makes it current. A failed fetch therefore leaves the displayed page number
//! and the displayed data in agreement.

use std::fmt;
use std::str::FromStr;

use crate::request::{Orientation, Selections, build_result_url};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    First,
    Prev,
    Next,
    Last,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" => Ok(Direction::First),
            "prev" | "previous" => Ok(Direction::Prev),
            "next" => Ok(Direction::Next),
            "last" => Ok(Direction::Last),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// A result request ready to send, either fresh or derived from the last one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub base_url: String,
    pub selections: Selections,
    pub page_size: usize,
    pub page: usize,
    pub sql_override: Option<String>,
}

impl PageRequest {
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.page_size
    }

    pub fn url(&self) -> String {
        build_result_url(
            &self.base_url,
            &self.selections,
            self.offset(),
            self.page_size,
            Orientation::Rows,
            self.sql_override.as_deref(),
        )
    }
}

/// Snapshot of the last successful result request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastRequest {
    pub base_url: String,
    pub selections: Selections,
    pub page_size: usize,
    pub current_page: usize,
    pub sql_override: Option<String>,
    /// Known only for table results
    pub total_rows: Option<u64>,
}

/// Number of pages for a row count; zero rows still shows one page
pub fn total_pages(total_rows: u64, page_size: usize) -> usize {
    let page_size = page_size.max(1) as u64;
    total_rows.div_ceil(page_size).max(1) as usize
}

#[derive(Clone, Debug, Default)]
pub struct ResultPager {
    last: Option<LastRequest>,
}

impl ResultPager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_request(&self) -> Option<&LastRequest> {
        self.last.as_ref()
    }

    pub fn has_request(&self) -> bool {
        self.last.is_some()
    }

    /// Forget the last request, e.g. after switching data object
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Page-1 request for an Apply / Run Query action
    ///
    /// `selections` is copied so later form edits cannot leak into pagination.
    pub fn plan_apply(
        &self,
        base_url: &str,
        selections: &Selections,
        page_size: usize,
        sql_override: Option<&str>,
    ) -> PageRequest {
        PageRequest {
            base_url: base_url.to_string(),
            selections: selections.clone(),
            page_size: page_size.max(1),
            page: 1,
            sql_override: sql_override.map(str::to_string),
        }
    }

    /// Request for a pagination click, or `None` when that direction is disabled
    pub fn plan(&self, direction: Direction) -> Option<PageRequest> {
        let last = self.last.as_ref()?;
        let allowed = match direction {
            Direction::First | Direction::Prev => self.can_go_back(),
            Direction::Next | Direction::Last => self.can_go_forward(),
        };
        if !allowed {
            return None;
        }

        let pages = total_pages(last.total_rows.unwrap_or(0), last.page_size);
        let page = match direction {
            Direction::First => 1,
            Direction::Prev => last.current_page.saturating_sub(1).max(1),
            Direction::Next => (last.current_page + 1).min(pages),
            Direction::Last => pages,
        };

        Some(PageRequest {
            base_url: last.base_url.clone(),
            selections: last.selections.clone(),
            page_size: last.page_size,
            page,
            sql_override: last.sql_override.clone(),
        })
    }

    /// Record a request whose response arrived successfully
    ///
    /// # Arguments
    /// * `request` - The request that was sent
    /// * `total_rows` - Row count from a table response, `None` for PNG/HTML
    pub fn commit(&mut self, request: PageRequest, total_rows: Option<u64>) {
        let page = match total_rows {
            Some(rows) => request.page.min(total_pages(rows, request.page_size)),
            None => request.page,
        };
        self.last = Some(LastRequest {
            base_url: request.base_url,
            selections: request.selections,
            page_size: request.page_size,
            current_page: page,
            sql_override: request.sql_override,
            total_rows,
        });
    }

    pub fn current_page(&self) -> usize {
        self.last.as_ref().map(|l| l.current_page).unwrap_or(1)
    }

    /// Total pages, or `None` when pagination does not apply
    pub fn total_pages(&self) -> Option<usize> {
        let last = self.last.as_ref()?;
        last.total_rows.map(|rows| total_pages(rows, last.page_size))
    }

    pub fn can_go_back(&self) -> bool {
        match &self.last {
            Some(last) => last.total_rows.is_some() && last.current_page > 1,
            None => false,
        }
    }

    pub fn can_go_forward(&self) -> bool {
        match &self.last {
            Some(LastRequest {
                total_rows: Some(rows),
                current_page,
                page_size,
                ..
            }) => *rows > (*current_page as u64) * (*page_size as u64),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<PageStatus> {
        Some(PageStatus {
            page: self.current_page(),
            total_pages: self.total_pages()?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageStatus {
    pub page: usize,
    pub total_pages: usize,
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page {} of {}", self.page, self.total_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pager_at(page: usize, rows: u64, size: usize) -> ResultPager {
        let mut pager = ResultPager::new();
        let mut req = pager.plan_apply("/r", &Selections::new(), size, None);
        req.page = page;
        pager.commit(req, Some(rows));
        pager
    }

    #[test]
    fn test_zero_rows_is_one_page() {
        let pager = pager_at(1, 0, 1000);
        assert_eq!(pager.status().unwrap().to_string(), "Page 1 of 1");
        assert!(pager.plan(Direction::Next).is_none());
        assert!(pager.plan(Direction::Prev).is_none());
        assert!(pager.plan(Direction::Last).is_none());
        assert!(pager.plan(Direction::First).is_none());
    }

    #[test]
    fn test_back_is_noop_on_first_page() {
        let pager = pager_at(1, 50, 10);
        assert_eq!(pager.status().unwrap().to_string(), "Page 1 of 5");
        assert!(!pager.can_go_back());
        assert!(pager.can_go_forward());
        assert!(pager.plan(Direction::Prev).is_none());
        assert!(pager.plan(Direction::First).is_none());
        assert_eq!(pager.current_page(), 1);
    }

    #[test]
    fn test_last_and_first() {
        let pager = pager_at(2, 95, 10);
        assert_eq!(pager.plan(Direction::Last).unwrap().page, 10);
        assert_eq!(pager.plan(Direction::First).unwrap().page, 1);
        assert_eq!(pager.plan(Direction::Next).unwrap().offset(), 20);
    }

    #[test]
    fn test_non_tabular_hides_pagination() {
        let mut pager = ResultPager::new();
        let req = pager.plan_apply("/dash", &Selections::new(), 100, None);
        pager.commit(req, None);
        assert!(pager.status().is_none());
        assert!(pager.plan(Direction::Next).is_none());
    }

    #[test]
    fn test_no_request_is_noop() {
        let pager = ResultPager::new();
        assert!(pager.plan(Direction::First).is_none());
        assert_eq!(pager.current_page(), 1);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("Prev".parse::<Direction>(), Ok(Direction::Prev));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
