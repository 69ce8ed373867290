/// What the content fetcher could pull out of an article page. Both fields
/// are best-effort; a failed fetch is simply two `None`s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub main_text: Option<String>,
    pub preview_image_url: Option<String>,
}

impl FetchResult {
    pub fn absent() -> Self {
        Self::default()
    }
}
