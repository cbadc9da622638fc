use urlencoding::encode as url_encode;

/// Parameters of a `buildWithParameters` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest<'a> {
    pub token: &'a str,
    pub environment: &'a str,
    pub tag: &'a str,
    pub upload: bool,
    pub live: bool,
}

impl BuildRequest<'_> {
    /// Full trigger URL under `base_url`, which must end with `/`.
    pub fn url(&self, base_url: &str) -> String {
        let mut url = format!(
            "{}buildWithParameters?token={}&ENV={}&TAG={}&UPLOAD={}",
            base_url,
            url_encode(self.token),
            url_encode(self.environment),
            url_encode(self.tag),
            self.upload
        );
        if self.live {
            url.push_str(&format!("&LIVE={}", self.live));
        }
        url
    }
}
