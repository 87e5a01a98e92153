#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub ids: Option<Vec<crate::ID>>,
    pub kinds: Option<Vec<crate::Kind>>,
    pub authors: Option<Vec<crate::PubKey>>,
    pub since: Option<crate::Timestamp>,
    pub until: Option<crate::Timestamp>,
    pub limit: Option<usize>,
}

impl serde::Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeMap;
        let len = [
            self.ids.is_some(),
            self.authors.is_some(),
            self.kinds.is_some(),
            self.since.is_some(),
            self.until.is_some(),
            self.limit.is_some(),
        ]
        .iter()
        .fold(0, |sum, v| sum + if *v { 1 } else { 0 });

        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(ref ids) = self.ids {
            map.serialize_entry("ids", ids)?;
        }
        if let Some(ref authors) = self.authors {
            map.serialize_entry("authors", authors)?;
        }
        if let Some(ref kinds) = self.kinds {
            map.serialize_entry("kinds", kinds)?;
        }
        if let Some(s) = self.since {
            map.serialize_entry("since", &s)?;
        }
        if let Some(u) = self.until {
            map.serialize_entry("until", &u)?;
        }
        if let Some(l) = self.limit {
            map.serialize_entry("limit", &l)?;
        }
        map.end()
    }
}

impl Filter {
    pub fn matches(&self, event: &crate::Event) -> bool {
        if let Some(ref ids) = self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if let Some(ref authors) = self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }

        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }

        true
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "Filter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PubKey, Timestamp, TEXT_NOTE};

    const PK_HEX: &str = "d91191e30e00444b942c0e82cad470b32af171764c2275bee0bd99377efd4075";

    #[test]
    fn test_serialize_skips_absent_fields() {
        let filter = Filter {
            kinds: Some(vec![TEXT_NOTE]),
            authors: Some(vec![PubKey::from_hex(PK_HEX).unwrap()]),
            since: Some(Timestamp(90)),
            ..Default::default()
        };

        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(
            json,
            format!(
                "{{\"authors\":[\"{}\"],\"kinds\":[1],\"since\":90}}",
                PK_HEX
            )
        );

        let empty = serde_json::to_string(&Filter::default()).unwrap();
        assert_eq!(empty, "{}");
    }

    #[test]
    fn test_matches() {
        let author = PubKey::from_hex(PK_HEX).unwrap();
        let event: crate::Event = serde_json::from_str(&format!(
            "{{\"id\":\"{}\",\"pubkey\":\"{}\",\"created_at\":100,\"kind\":1,\"tags\":[],\"content\":\"hello\",\"sig\":\"{}\"}}",
            "5".repeat(64),
            PK_HEX,
            "6".repeat(128),
        ))
        .unwrap();

        let mut filter = Filter {
            kinds: Some(vec![TEXT_NOTE]),
            authors: Some(vec![author]),
            ..Default::default()
        };
        assert!(filter.matches(&event));

        filter.since = Some(Timestamp(101));
        assert!(!filter.matches(&event));

        filter.since = Some(Timestamp(100));
        assert!(filter.matches(&event));

        filter.kinds = Some(vec![crate::Kind(30023)]);
        assert!(!filter.matches(&event));
    }
}
