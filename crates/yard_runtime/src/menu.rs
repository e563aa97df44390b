use ahash::AHashMap;
use parking_lot::RwLock;
use yard_core::YardId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MenuPage {
    pub status: String,
    pub main_menu: String,
}

/// Latest menu text per yard, polled by the display.
#[derive(Debug, Default)]
pub struct MenuBoard {
    pages: RwLock<AHashMap<YardId, MenuPage>>,
}

impl MenuBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, yard: YardId, page: MenuPage) {
        self.pages.write().insert(yard, page);
    }

    pub fn status(&self, yard: YardId) -> Option<String> {
        self.pages.read().get(&yard).map(|p| p.status.clone())
    }

    pub fn main_menu(&self, yard: YardId) -> Option<String> {
        self.pages.read().get(&yard).map(|p| p.main_menu.clone())
    }

    /// Drop pages of yards not in `live`.
    pub fn retain(&self, live: impl Fn(YardId) -> bool) {
        self.pages.write().retain(|id, _| live(*id));
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}
