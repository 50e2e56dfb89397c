use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::limits::MAX_PAGES;
use crate::model::*;

use super::{ApiError, BookingApi};

/// `BookingApi` over HTTP. `base_url` is the API root, e.g. `https://host/api/`.
#[derive(Clone)]
pub struct HttpBookingApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBookingApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url).map_err(|e| ApiError::Transport(e.to_string()))?;
        // Url::join drops the last segment unless the base ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(concat!("weekbook/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client, base, token })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(self.request_url(method, url))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET a listing and follow its `next` links until the last page.
    /// Relative links resolve against the page that carried them.
    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let mut items = Vec::new();
        for _ in 0..MAX_PAGES {
            let listing: Listing<T> = self.send(self.request_url(Method::GET, url.clone())).await?;
            let (page, next) = listing.into_page();
            items.extend(page);
            match next {
                Some(next) => {
                    url = url
                        .join(&next)
                        .map_err(|e| ApiError::Decode(format!("bad next link {next:?}: {e}")))?;
                }
                None => return Ok(items),
            }
        }
        warn!("{path}: stopped after {MAX_PAGES} pages, listing is truncated");
        Ok(items)
    }

    /// Send and return the raw body of a successful response.
    async fn send_raw(&self, req: RequestBuilder) -> Result<String, ApiError> {
        let start = Instant::now();
        let response = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let url = response.url().path().to_owned();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        debug!(
            "{url} -> {} in {:.1}ms",
            status.as_u16(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send_raw(req).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        self.list("regions/").await
    }

    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        self.list("bookings/my/").await
    }

    async fn all_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        self.list("bookings/").await
    }

    async fn week_availability(&self, region: RegionId, year: i32) -> Result<RegionWeeks, ApiError> {
        let req = self
            .request(Method::GET, "weeks/availability/")?
            .query(&[("region_id", region.to_string()), ("year", year.to_string())]);
        self.send(req).await
    }

    async fn create_booking(&self, booking: &NewBooking) -> Result<BookingRecord, ApiError> {
        let req = self.request(Method::POST, "bookings/")?.json(booking);
        self.send(req).await
    }

    async fn update_booking(
        &self,
        id: BookingId,
        changes: &BookingChanges,
    ) -> Result<BookingRecord, ApiError> {
        let req = self
            .request(Method::PATCH, &format!("bookings/{id}/"))?
            .json(changes);
        self.send(req).await
    }

    async fn delete_booking(&self, id: BookingId) -> Result<(), ApiError> {
        self.send_raw(self.request(Method::DELETE, &format!("bookings/{id}/"))?)
            .await
            .map(|_| ())
    }

    async fn my_coverage(&self) -> Result<CoverageReport, ApiError> {
        self.send(self.request(Method::GET, "coverage/my/")?).await
    }

    async fn admin_coverage(&self) -> Result<Vec<CoverageReport>, ApiError> {
        self.list("admin/coverage/").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_without_trailing_slash_keeps_prefix() {
        let api = HttpBookingApi::new("http://localhost:8000/api", None, Duration::from_secs(1)).unwrap();
        let req = api.request(Method::GET, "regions/").unwrap().build().unwrap();
        assert_eq!(req.url().as_str(), "http://localhost:8000/api/regions/");
    }

    #[test]
    fn bearer_token_is_attached() {
        let api = HttpBookingApi::new(
            "http://localhost:8000/api/",
            Some("t0k".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        let req = api.request(Method::DELETE, "bookings/4/").unwrap().build().unwrap();
        assert_eq!(req.url().path(), "/api/bookings/4/");
        assert_eq!(req.headers()["authorization"], "Bearer t0k");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpBookingApi::new("not a url", None, Duration::from_secs(1)),
            Err(ApiError::Transport(_))
        ));
    }
}
