use serde::{Deserialize, Serialize};

use crate::repository::{Page, Paged};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> Page { Page::new(self.page, self.per_page) }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(paged: Paged<T>, page: Page) -> Self {
        Self { data: paged.items, total: paged.total, page: page.page, per_page: page.per_page }
    }
}
