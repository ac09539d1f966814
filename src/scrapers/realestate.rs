use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::{Address, AgentInfo, BasicFields, ImageDescriptor, ListingStub, PropertyFields};
use crate::scrapers::traits::{DetailFetcher, ListingFetcher};
use crate::scrapers::types::{Fetched, ListingPage, TransportConfig};

pub const BASE_URL: &str = "https://www.realestate.com.au";

/// Response header in which the scraping API reports the request cost
const COST_HEADER: &str = "spb-cost";

/// HTTP fetcher for realestate.com.au search and property pages
pub struct RealEstateScraper {
    client: Client,
    config: TransportConfig,
}

impl RealEstateScraper {
    /// Create a new scraper from transport settings
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// Download a page, directly or through the scraping API.
    ///
    /// Returns the body and the credits the request cost.
    async fn get(&self, url: &str) -> Result<(String, u64), FetchError> {
        let request = match &self.config.scraping_api {
            Some(api) => {
                let mut query = vec![
                    ("api_key", api.api_key.clone()),
                    ("url", url.to_string()),
                    ("render_js", api.render_js.to_string()),
                ];
                if let Some(country) = &api.country_code {
                    query.push(("premium_proxy", "true".to_string()));
                    query.push(("country_code", country.clone()));
                }
                self.client.get(&api.endpoint).query(&query)
            }
            None => self.client.get(url),
        };

        debug!("Fetching URL: {}", url);
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} returned status: {}", url, status);
            return Err(FetchError::transport(url, format!("HTTP {status}")));
        }

        let credits = match &self.config.scraping_api {
            Some(_) => response
                .headers()
                .get(COST_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1),
            None => 0,
        };

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        debug!("Downloaded {} bytes of HTML", html.len());

        Ok((html, credits))
    }
}

#[async_trait]
impl ListingFetcher for RealEstateScraper {
    async fn fetch_page(&self, url: &str) -> Result<Fetched<ListingPage>, FetchError> {
        let (html, credits) = self.get(url).await?;
        let page = parse_listing_page(&html, url).map_err(|e| FetchError::parse(url, e))?;
        Ok(Fetched::new(page, credits))
    }

    fn page_url(&self, base_url: &str, page_number: u32) -> Option<String> {
        numbered_page_url(base_url, page_number)
    }

    fn source_name(&self) -> &'static str {
        "realestate.com.au"
    }
}

#[async_trait]
impl DetailFetcher for RealEstateScraper {
    async fn fetch_detail(&self, url: &str) -> Result<Fetched<PropertyFields>, FetchError> {
        let (html, credits) = self.get(url).await?;
        let fields = parse_detail_page(&html).map_err(|e| FetchError::parse(url, e))?;
        Ok(Fetched::new(fields, credits))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e}"))
}

/// Whitespace-collapsed text of an element
fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).map(text_of).find(|t| !t.is_empty()))
}

/// First run of digits in `text`: "3 bedrooms" -> 3
pub fn extract_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn absolutize(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{BASE_URL}{href}")
    } else {
        format!("{BASE_URL}/{href}")
    }
}

/// Id from ".../property-house-qld-paddington-143160680" style URLs
pub fn property_id_from_url(url: &str) -> Option<String> {
    let tail = url.split("/property-").nth(1)?;
    let tail = tail.split(['?', '#', '/']).next()?;
    let id = tail.rsplit('-').next()?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Rewrite the `list-N` segment of a search URL to the given page.
pub fn numbered_page_url(base_url: &str, page_number: u32) -> Option<String> {
    let start = base_url.find("/list-")? + "/list-".len();
    let digits = base_url[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    Some(format!(
        "{}{}{}",
        &base_url[..start],
        page_number,
        &base_url[start + digits..]
    ))
}

/// Read bed/bath/car counts from "3 bedrooms" style labels.
fn apply_feature_label(label: &str, bedrooms: &mut Option<u32>, bathrooms: &mut Option<u32>, parking: &mut Option<u32>) {
    let lower = label.to_lowercase();
    let slot = if lower.contains("bed") {
        bedrooms
    } else if lower.contains("bath") {
        bathrooms
    } else if lower.contains("car") || lower.contains("park") || lower.contains("garage") {
        parking
    } else {
        return;
    };
    if slot.is_none() {
        *slot = extract_number(label);
    }
}

/// Parse one search results page into listing stubs.
///
/// A page with a "no results" marker is an empty page; a page with neither
/// cards nor that marker (block page, layout change) is an error.
pub fn parse_listing_page(html: &str, page_url: &str) -> Result<ListingPage> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let card_sel = selector(
        r#"[data-testid="residential-card"], article.residential-card, .listing-result"#,
    )?;
    let cards: Vec<ElementRef<'_>> = document.select(&card_sel).collect();

    if cards.is_empty() {
        let no_results = selector(r#"[data-testid="no-results"], .no-results"#)?;
        if document.select(&no_results).next().is_some() {
            return Ok(ListingPage::default());
        }
        return Err(anyhow!("no property cards on {page_url}"));
    }
    debug!("Found {} property cards in HTML", cards.len());

    let link_sel = selector(r#"a[href*="/property-"]"#)?;
    let label_sel = selector("[aria-label]")?;
    let mut stubs = Vec::new();

    for card in cards {
        let Some(href) = card.select(&link_sel).find_map(|a| a.value().attr("href")) else {
            debug!("Skipped card without property link");
            continue;
        };
        let url = absolutize(href);
        let Some(id) = property_id_from_url(&url) else {
            debug!("Skipped card with unrecognised link {}", url);
            continue;
        };

        let mut basic = BasicFields {
            title: first_text(card, r#"[data-testid="address-line1"], h2, .property-title"#)?,
            price: first_text(card, r#"[data-testid="property-price"], .property-price, .price"#)?,
            address: first_text(
                card,
                r#"[data-testid="address"], .residential-card__address-heading, .property-address"#,
            )?,
            property_type: first_text(card, r#".residential-card__property-type, [data-testid="property-type"]"#)?,
            ..Default::default()
        };

        for element in card.select(&label_sel) {
            if let Some(label) = element.value().attr("aria-label") {
                apply_feature_label(label, &mut basic.bedrooms, &mut basic.bathrooms, &mut basic.parking);
            }
        }
        basic
            .extra
            .insert("scraped_from".to_string(), json!("listing_page"));

        stubs.push(ListingStub { id, url, basic });
    }

    let next_sel = selector(r#"a[rel="next"], [data-testid="paginator-next-page"]"#)?;
    let next_page_url = root
        .select(&next_sel)
        .find_map(|a| a.value().attr("href"))
        .map(absolutize);

    Ok(ListingPage {
        stubs,
        next_page_url,
    })
}

/// Parse a property detail page into normalized fields.
pub fn parse_detail_page(html: &str) -> Result<PropertyFields> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let heading = first_text(root, r#"h1, [data-testid="listing-details__summary-title"]"#)?;
    let description = first_text(
        root,
        r#"[data-testid="listing-details__description"], .property-description__content, .property-description"#,
    )?;
    if heading.is_none() && description.is_none() {
        return Err(anyhow!("page has neither a heading nor a description"));
    }

    let mut fields = PropertyFields {
        title: heading.clone(),
        price: first_text(
            root,
            r#"[data-testid="listing-details__summary-price"], .property-price, .property-info__price"#,
        )?,
        property_type: first_text(root, r#".property-info__property-type, [data-testid="property-type"]"#)?,
        description,
        listing_date: first_text(root, r#"[data-testid="listed-date"], .property-info__date-listed"#)?,
        ..Default::default()
    };

    if let Some(full) = first_text(root, r#".property-info-address, [data-testid="address"]"#)?.or(heading) {
        fields.address = Address::from_full(&full);
    }

    let label_sel = selector(r#"[data-testid="property-features-text-container"] [aria-label], .property-info__primary-features [aria-label]"#)?;
    for element in document.select(&label_sel) {
        if let Some(label) = element.value().attr("aria-label") {
            let label = label.to_string();
            apply_feature_label(&label, &mut fields.bedrooms, &mut fields.bathrooms, &mut fields.parking);
            if label.to_lowercase().contains("land") && fields.land_size.is_none() {
                fields.land_size = Some(label.clone());
            }
            if label.to_lowercase().contains("building") && fields.building_size.is_none() {
                fields.building_size = Some(label);
            }
        }
    }

    let feature_sel = selector(r#".property-features__feature, [data-testid="property-features-feature"]"#)?;
    for element in document.select(&feature_sel) {
        let text = text_of(element);
        if !text.is_empty() && !fields.features.contains(&text) {
            fields.features.push(text);
        }
    }

    let image_sel = selector(r#"[data-testid="gallery"] img, .hero-image img, .media-viewer img"#)?;
    for img in document.select(&image_sel) {
        let Some(src) = img.value().attr("src").or_else(|| img.value().attr("data-src")) else {
            continue;
        };
        let url = absolutize(src);
        if fields.images.iter().any(|i| i.url == url) {
            continue;
        }
        fields.images.push(ImageDescriptor {
            url,
            alt: img.value().attr("alt").map(str::to_string).filter(|a| !a.is_empty()),
            local_path: None,
        });
    }

    let agent = AgentInfo {
        name: first_text(root, r#".agent-info__name, [data-testid="agent-name"]"#)?,
        agency: first_text(root, r#".agent-info__agency, .branding__name, [data-testid="agency-name"]"#)?,
        phone: {
            let tel = selector(r#"a[href^="tel:"]"#)?;
            document
                .select(&tel)
                .find_map(|a| a.value().attr("href"))
                .map(|h| h.trim_start_matches("tel:").to_string())
        },
    };
    if !agent.is_empty() {
        fields.agent = agent;
    }

    fields
        .extra
        .insert("scrape_method".to_string(), json!("html_selectors"));

    Ok(fields)
}
