use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Address, Coordinates};
use crate::providers::cep::{CepClient, CepError};
use crate::providers::geocode::{GeocodeClient, GeocodeError, GeocodeQuery};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Input did not reduce to exactly 8 digits; reported before any
    /// network call is made
    #[error("Invalid postal code format: {0}")]
    InvalidFormat(String),
    /// The address provider had no answer (or was unavailable, which is
    /// treated the same way); non-fatal for the batch
    #[error("Postal code not found: {0}")]
    NotFound(String),
}

/// Resolves raw postal codes to addresses and addresses to coordinates
pub struct Resolver {
    cep: Arc<CepClient>,
    geocoder: Arc<GeocodeClient>,
}

impl Resolver {
    pub fn new(cep: Arc<CepClient>, geocoder: Arc<GeocodeClient>) -> Self {
        Self { cep, geocoder }
    }

    /// Resolve a raw code to an address. Coordinate lookup is a separate
    /// step ([`Resolver::geocode`]) and is skipped entirely when this fails.
    pub async fn resolve(&self, raw: &str) -> Result<Address, ResolveError> {
        let code =
            normalize_code(raw).ok_or_else(|| ResolveError::InvalidFormat(raw.to_string()))?;

        match self.cep.lookup(&code).await {
            Ok(address) => Ok(address),
            Err(CepError::NotFound) => Err(ResolveError::NotFound(code)),
            Err(e) => {
                // Provider unavailability degrades to NotFound; the batch
                // keeps going
                tracing::warn!(code = %code, error = %e, "Address lookup failed");
                Err(ResolveError::NotFound(code))
            }
        }
    }

    /// Run the geocoding cascade for a resolved address
    ///
    /// Strategies are tried in order and the first one producing finite
    /// coordinates wins. `None` means every strategy exhausted; the address
    /// keeps empty coordinates and the batch continues.
    pub async fn geocode(&self, address: &Address) -> Option<Coordinates> {
        let queries = geocode_queries(address);
        run_cascade(&queries, |query| self.geocoder.search(query)).await
    }

    /// Full intake resolution for one raw code: address lookup followed by
    /// the geocoding cascade. Missing coordinates are not an error; the
    /// address is returned without them.
    pub async fn locate(&self, raw: &str) -> Result<Address, ResolveError> {
        let mut address = self.resolve(raw).await?;
        address.coordinates = self.geocode(&address).await;
        Ok(address)
    }
}

/// Reduce free-form input to a normalized 8-digit code
///
/// Returns None unless the digits in the input number exactly 8.
pub fn normalize_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 8).then_some(digits)
}

/// Strip provider noise from a street or district name: address-range and
/// parity annotations appended after " - ", and parenthetical aliases
pub fn strip_address_noise(name: &str) -> String {
    let base = name.split(" - ").next().unwrap_or(name);
    let base = match base.find('(') {
        Some(idx) => &base[..idx],
        None => base,
    };
    base.trim().trim_end_matches(',').trim().to_string()
}

/// Build the ordered strategy list for an address
///
/// Priority order, short-circuit-first:
/// 1. structured street + city + state
/// 2. postal code alone
/// 3. free-text "street, city, state"
/// 4. free-text "district, city, state"
///
/// Strategies whose inputs are empty after cleaning are omitted (their
/// queries would be vacuous), preserving the relative order of the rest.
pub fn geocode_queries(address: &Address) -> Vec<GeocodeQuery> {
    let street = strip_address_noise(&address.street);
    let district = strip_address_noise(&address.district);
    let mut queries = Vec::with_capacity(4);

    if !street.is_empty() {
        queries.push(GeocodeQuery::Structured {
            street: street.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
        });
    }
    if !address.postal_code.is_empty() {
        queries.push(GeocodeQuery::PostalCode(address.postal_code.clone()));
    }
    if !street.is_empty() {
        queries.push(GeocodeQuery::FreeText(format!(
            "{}, {}, {}",
            street, address.city, address.state
        )));
    }
    if !district.is_empty() {
        queries.push(GeocodeQuery::FreeText(format!(
            "{}, {}, {}",
            district, address.city, address.state
        )));
    }

    queries
}

/// Evaluate the strategy list: first query returning at least one finite
/// coordinate pair wins and later strategies are not invoked. Provider
/// errors are logged and treated like empty results.
///
/// The query lifetime is named so the fetch function's future may borrow
/// the query it was handed, as a real client call does.
pub async fn run_cascade<'a, F, Fut>(queries: &'a [GeocodeQuery], mut fetch: F) -> Option<Coordinates>
where
    F: FnMut(&'a GeocodeQuery) -> Fut,
    Fut: Future<Output = Result<Vec<Coordinates>, GeocodeError>>,
{
    for query in queries {
        match fetch(query).await {
            Ok(results) => {
                if let Some(coords) = results.into_iter().find(|c| c.is_finite()) {
                    return Some(coords);
                }
                tracing::debug!(?query, "Geocode strategy returned no usable result");
            }
            Err(e) => {
                tracing::debug!(?query, error = %e, "Geocode strategy failed, trying next");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn address(street: &str, district: &str) -> Address {
        Address {
            postal_code: "01310100".to_string(),
            street: street.to_string(),
            district: district.to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            coordinates: None,
        }
    }

    #[test]
    fn normalization_accepts_any_eight_digit_shape() {
        assert_eq!(normalize_code("01310-100").as_deref(), Some("01310100"));
        assert_eq!(normalize_code("01310100").as_deref(), Some("01310100"));
        assert_eq!(normalize_code("cep 01310.100").as_deref(), Some("01310100"));
    }

    #[test]
    fn normalization_rejects_everything_else() {
        assert_eq!(normalize_code("bad-code"), None);
        assert_eq!(normalize_code("1234567"), None);
        assert_eq!(normalize_code("123456789"), None);
        assert_eq!(normalize_code(""), None);
    }

    #[test]
    fn noise_stripping_removes_range_annotations() {
        assert_eq!(
            strip_address_noise("Avenida Paulista - de 612 a 1510 - lado par"),
            "Avenida Paulista"
        );
        assert_eq!(
            strip_address_noise("Rua Funchal (Vila Olímpia)"),
            "Rua Funchal"
        );
        assert_eq!(strip_address_noise("Rua Augusta"), "Rua Augusta");
    }

    #[test]
    fn strategy_list_is_ordered_and_complete() {
        let queries = geocode_queries(&address("Avenida Paulista - lado ímpar", "Bela Vista"));
        assert_eq!(queries.len(), 4);
        assert!(matches!(
            &queries[0],
            GeocodeQuery::Structured { street, .. } if street == "Avenida Paulista"
        ));
        assert!(matches!(&queries[1], GeocodeQuery::PostalCode(c) if c == "01310100"));
        assert!(matches!(&queries[2], GeocodeQuery::FreeText(q) if q.starts_with("Avenida Paulista")));
        assert!(matches!(&queries[3], GeocodeQuery::FreeText(q) if q.starts_with("Bela Vista")));
    }

    #[test]
    fn strategy_list_skips_vacuous_queries() {
        // No street: the structured and street free-text strategies vanish
        let queries = geocode_queries(&address("", "Centro"));
        assert_eq!(queries.len(), 2);
        assert!(matches!(&queries[0], GeocodeQuery::PostalCode(_)));
        assert!(matches!(&queries[1], GeocodeQuery::FreeText(q) if q.starts_with("Centro")));
    }

    #[tokio::test]
    async fn cascade_stops_at_first_success() {
        let queries = geocode_queries(&address("Avenida Paulista", "Bela Vista"));
        let calls = Rc::new(RefCell::new(0usize));

        let counter = calls.clone();
        let result = run_cascade(&queries, move |_query| {
            let counter = counter.clone();
            async move {
                let n = {
                    let mut c = counter.borrow_mut();
                    *c += 1;
                    *c
                };
                if n == 2 {
                    Ok(vec![Coordinates { lat: -23.56, lon: -46.65 }])
                } else {
                    Ok(vec![])
                }
            }
        })
        .await;

        assert!(result.is_some());
        // Strategy 2 succeeded; strategies 3 and 4 must not run
        assert_eq!(*calls.borrow(), 2);
    }

    #[tokio::test]
    async fn cascade_skips_errors_and_non_finite_results() {
        let queries = geocode_queries(&address("Avenida Paulista", "Bela Vista"));
        let calls = Rc::new(RefCell::new(0usize));

        let counter = calls.clone();
        let result = run_cascade(&queries, move |_query| {
            let counter = counter.clone();
            async move {
                let n = {
                    let mut c = counter.borrow_mut();
                    *c += 1;
                    *c
                };
                match n {
                    1 => Err(GeocodeError::NetworkError("timeout".to_string())),
                    2 => Ok(vec![Coordinates { lat: f64::INFINITY, lon: 0.0 }]),
                    _ => Ok(vec![Coordinates { lat: -23.56, lon: -46.65 }]),
                }
            }
        })
        .await;

        assert!(result.is_some());
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn cascade_exhaustion_yields_none() {
        let queries = geocode_queries(&address("Avenida Paulista", "Bela Vista"));
        let result = run_cascade(&queries, |_query| async { Ok(vec![]) }).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cascade_accepts_fetch_futures_that_borrow_the_query() {
        // Same shape as a real client call: the future holds the borrowed
        // query across an await point
        async fn fetch(query: &GeocodeQuery) -> Result<Vec<Coordinates>, GeocodeError> {
            tokio::task::yield_now().await;
            match query {
                GeocodeQuery::PostalCode(_) => Ok(vec![Coordinates { lat: -23.56, lon: -46.65 }]),
                _ => Ok(vec![]),
            }
        }

        let queries = geocode_queries(&address("Avenida Paulista", "Bela Vista"));
        let result = run_cascade(&queries, fetch).await;
        assert!(result.is_some());
    }
}
