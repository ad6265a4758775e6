use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u32 = 25;
const MIN_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageRequest {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn size(&self) -> u32 {
        self.size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.size())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total_records: i64,
    pub total_pages: i64,
    pub current_page: u32,
    pub records: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total_records: i64, records: Vec<T>) -> Self {
        let size = i64::from(request.size());
        Self {
            total_records,
            total_pages: (total_records + size - 1) / size,
            current_page: request.page(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_clamped_and_page_starts_at_one() {
        let req = PageRequest { page: Some(0), size: Some(500) };
        assert_eq!(req.page(), 1);
        assert_eq!(req.size(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 0);

        let req = PageRequest { page: Some(3), size: Some(2) };
        assert_eq!(req.size(), MIN_PAGE_SIZE);
        assert_eq!(req.offset(), 20);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(PageRequest::default(), 51, Vec::<()>::new());
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 1);

        let empty = Page::new(PageRequest::default(), 0, Vec::<()>::new());
        assert_eq!(empty.total_pages, 0);
    }
}
