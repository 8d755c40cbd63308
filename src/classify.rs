use url::Url;

use crate::query::PageQuery;

/// A visit's (source, medium, campaign) classification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribution {
    pub source: String,
    pub medium: String,
    pub campaign: String,
}

impl Attribution {
    fn direct(campaign: String) -> Self {
        Self {
            source: "direct".to_owned(),
            medium: "none".to_owned(),
            campaign,
        }
    }
}

/// Search engines, matched by substring against the referrer hostname.
const SEARCH_ENGINES: &[(&str, &[&str])] = &[
    ("google", &["google"]),
    ("bing", &["bing", "msn"]),
    ("yahoo", &["yahoo"]),
    ("duckduckgo", &["duckduckgo"]),
    ("yandex", &["yandex"]),
    ("baidu", &["baidu"]),
];

/// Social networks, likewise substring-matched.
const SOCIAL_NETWORKS: &[(&str, &[&str])] = &[
    ("facebook", &["facebook", "fb.com"]),
    ("twitter", &["twitter", "x.com", "t.co"]),
    ("instagram", &["instagram"]),
    ("linkedin", &["linkedin"]),
    ("pinterest", &["pinterest"]),
    ("youtube", &["youtube", "youtu.be"]),
    ("reddit", &["reddit"]),
    ("tiktok", &["tiktok"]),
];

/// Paid-click markers looked up in the current page query, in precedence
/// order. Only these exact names classify a visit as paid; the wider alias
/// lists in [`crate::TrackingKind::url_params`] apply to persistence, not to
/// classification.
const CLICK_MARKERS: &[(&str, &[&str])] = &[
    ("google", &["gclid"]),
    ("facebook", &["fbclid"]),
    ("bing", &["msclkid"]),
    ("tiktok", &["ttclid", "ttclid_ss", "clickid"]),
];

/// Classify a visit. Pure: the result depends only on the three arguments.
///
/// Decision order, first match wins:
/// 1. referrer host equals `current_hostname` (same-site navigation, with an
///    embedded `utm_campaign` in the internal link still honored),
/// 2. a paid-click marker in the current page query,
/// 3. empty or unparseable referrer,
/// 4. search-engine hostname substring,
/// 5. social-network hostname substring,
/// 6. anything else is a generic referral under the hostname verbatim.
///
/// Hostname matching is substring matching, so `m.google.co.uk` counts as
/// google.
pub fn classify(referrer: &str, query: &PageQuery, current_hostname: &str) -> Attribution {
    let referrer_url = Url::parse(referrer).ok();
    let referrer_host = referrer_url
        .as_ref()
        .and_then(|url| url.host_str())
        .map(str::to_owned);

    if let (Some(host), Some(url)) = (&referrer_host, &referrer_url) {
        if host == current_hostname {
            let campaign = PageQuery::from_url(url)
                .get("utm_campaign")
                .unwrap_or_default()
                .to_owned();
            return Attribution::direct(campaign);
        }
    }

    for (source, markers) in CLICK_MARKERS {
        if markers.iter().any(|marker| query.has(marker)) {
            return Attribution {
                source: (*source).to_owned(),
                medium: "cpc".to_owned(),
                campaign: query.get("utm_campaign").unwrap_or_default().to_owned(),
            };
        }
    }

    let Some(host) = referrer_host else {
        return Attribution::direct(String::new());
    };

    for (engine, domains) in SEARCH_ENGINES {
        if domains.iter().any(|domain| host.contains(domain)) {
            return Attribution {
                source: (*engine).to_owned(),
                medium: "organic".to_owned(),
                campaign: String::new(),
            };
        }
    }

    for (network, domains) in SOCIAL_NETWORKS {
        if domains.iter().any(|domain| host.contains(domain)) {
            return Attribution {
                source: (*network).to_owned(),
                medium: "social".to_owned(),
                campaign: String::new(),
            };
        }
    }

    Attribution {
        source: host,
        medium: "referral".to_owned(),
        campaign: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Attribution, classify};
    use crate::query::PageQuery;

    const HOST: &str = "shop.example.com";

    fn no_query() -> PageQuery {
        PageQuery::from_query("")
    }

    #[test]
    fn empty_referrer_is_direct() {
        let got = classify("", &no_query(), HOST);
        assert_eq!(got, Attribution::direct(String::new()));
    }

    #[test]
    fn unparseable_referrer_is_direct() {
        let got = classify("::not a url::", &no_query(), HOST);
        assert_eq!(got, Attribution::direct(String::new()));
    }

    #[test]
    fn same_site_referrer_is_direct_regardless_of_query() {
        let query = PageQuery::from_query("gclid=abc");
        let got = classify("https://shop.example.com/landing", &query, HOST);
        assert_eq!(got.source, "direct");
        assert_eq!(got.medium, "none");
    }

    #[test]
    fn same_site_referrer_keeps_embedded_campaign() {
        let got = classify(
            "https://shop.example.com/landing?utm_campaign=internal-banner",
            &no_query(),
            HOST,
        );
        assert_eq!(got, Attribution::direct("internal-banner".to_owned()));
    }

    #[test]
    fn gclid_beats_search_domain_matching() {
        let query = PageQuery::from_query("gclid=abc&utm_campaign=spring");
        let got = classify("https://www.google.com/search?q=x", &query, HOST);
        assert_eq!(
            got,
            Attribution {
                source: "google".to_owned(),
                medium: "cpc".to_owned(),
                campaign: "spring".to_owned(),
            }
        );
    }

    #[test]
    fn gclid_with_empty_referrer_is_paid_google() {
        let query = PageQuery::from_query("gclid=abc123");
        let got = classify("", &query, HOST);
        assert_eq!(got.source, "google");
        assert_eq!(got.medium, "cpc");
        assert_eq!(got.campaign, "");
    }

    #[test]
    fn click_markers_map_to_their_networks() {
        for (marker, source) in [
            ("fbclid", "facebook"),
            ("msclkid", "bing"),
            ("ttclid", "tiktok"),
            ("ttclid_ss", "tiktok"),
            ("clickid", "tiktok"),
        ] {
            let query = PageQuery::from_query(&format!("{marker}=1"));
            let got = classify("https://somewhere.example.org/", &query, HOST);
            assert_eq!(got.source, source, "marker {marker}");
            assert_eq!(got.medium, "cpc");
        }
    }

    #[test]
    fn search_engine_hostnames_match_by_substring() {
        let got = classify("https://m.google.co.uk/search", &no_query(), HOST);
        assert_eq!(got.source, "google");
        assert_eq!(got.medium, "organic");
        assert_eq!(got.campaign, "");

        let got = classify("https://www.msn.com/", &no_query(), HOST);
        assert_eq!(got.source, "bing");
        assert_eq!(got.medium, "organic");
    }

    #[test]
    fn social_hostnames_classify_as_social() {
        let got = classify("https://t.co/abcd", &no_query(), HOST);
        assert_eq!(got.source, "twitter");
        assert_eq!(got.medium, "social");

        let got = classify("https://youtu.be/xyz", &no_query(), HOST);
        assert_eq!(got.source, "youtube");
    }

    #[test]
    fn anything_else_is_a_referral_under_its_hostname() {
        let got = classify("https://blog.partner.io/post/1", &no_query(), HOST);
        assert_eq!(
            got,
            Attribution {
                source: "blog.partner.io".to_owned(),
                medium: "referral".to_owned(),
                campaign: String::new(),
            }
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let query = PageQuery::from_query("utm_campaign=repeat");
        let first = classify("https://duckduckgo.com/?q=x", &query, HOST);
        let second = classify("https://duckduckgo.com/?q=x", &query, HOST);
        assert_eq!(first, second);
    }
}
