//! Canonical/venue symbol identity and the idempotent translator contract every exchange
//! adapter implements (spec §3.1, §4.A).
//!
//! A `Symbol` is an opaque, exchange-specific identifier (`ETH_USDC_PERP`, `ETH-USDT-SWAP`,
//! `ETH`). An engine instance carries a *canonical* form, the form the strategy registered
//! under, and translates to/from a *venue* form on the way in/out of an adapter.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Opaque symbol string. Equality and hashing are on the raw string - callers are expected to
/// only compare symbols already in the same (canonical or venue) form.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct Symbol(pub SmolStr);

impl Symbol {
    pub fn new<S>(value: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S> From<S> for Symbol
where
    S: Into<SmolStr>,
{
    fn from(value: S) -> Self {
        Self::new(value)
    }
}

/// Parsed components of a loosely-formatted input symbol (`BASE`, `BASE/QUOTE`,
/// `BASE-QUOTE-SWAP`, `BASE_QUOTE_PERP`, ...), recovered by stripping any recognised venue
/// suffix and separator before an adapter rebuilds its own native form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SymbolParts {
    pub base: String,
    pub quote: Option<String>,
}

impl SymbolParts {
    /// Split `input` on the first separator found among `_`, `-`, `/`, discarding any trailing
    /// contract-type suffix (`PERP`, `SWAP`, `SPOT`, case-insensitively).
    pub fn parse(input: &str) -> Self {
        const SUFFIXES: [&str; 3] = ["PERP", "SWAP", "SPOT"];

        let separator = input.find(['_', '-', '/']);
        let Some(sep_idx) = separator else {
            return SymbolParts {
                base: input.to_uppercase(),
                quote: None,
            };
        };

        let sep = input.as_bytes()[sep_idx] as char;
        let mut segments: Vec<&str> = input.split(sep).collect();

        if let Some(last) = segments.last() {
            if SUFFIXES.iter().any(|suffix| suffix.eq_ignore_ascii_case(last)) {
                segments.pop();
            }
        }

        match segments.as_slice() {
            [base] => SymbolParts {
                base: base.to_uppercase(),
                quote: None,
            },
            [base, quote, ..] => SymbolParts {
                base: base.to_uppercase(),
                quote: Some(quote.to_uppercase()),
            },
            [] => SymbolParts {
                base: input.to_uppercase(),
                quote: None,
            },
        }
    }
}

/// An adapter's symbol translation contract: recognise its own native form, rebuild a native
/// form out of any other recognised shape, and reverse the mapping for data arriving from the
/// venue (eg/ WebSocket stream names). Both directions must be idempotent and total: applied
/// twice to an already-canonical or already-venue string, the result is unchanged, and no
/// non-empty input ever panics or errors.
pub trait SymbolTranslator {
    /// The quote asset this adapter denominates perpetuals in by default (eg/ `USDC`, `USDT`).
    fn default_quote(&self) -> &str;

    /// The venue-native suffix/separator convention, used by [`SymbolTranslator::to_venue`]'s
    /// default implementation.
    fn venue_form(&self, base: &str, quote: &str) -> Symbol;

    /// Translate any recognised symbol shape into this adapter's native venue form.
    ///
    /// Idempotent: `to_venue(to_venue(s)) == to_venue(s)`.
    fn to_venue(&self, symbol: &Symbol) -> Symbol {
        let raw = symbol.as_str();
        if raw.is_empty() {
            return symbol.clone();
        }

        let probe = self.venue_form("BASE", "QUOTE");
        if Self::matches_shape(raw, probe.as_str()) {
            return symbol.clone();
        }

        let parts = SymbolParts::parse(raw);
        let quote = parts.quote.unwrap_or_else(|| self.default_quote().to_string());
        self.venue_form(&parts.base, &quote)
    }

    /// Translate a venue-native symbol back to the canonical form a strategy registered under.
    /// Default implementation re-derives the canonical form as `BASE_QUOTE` so that it is
    /// always idempotent even without per-adapter overrides.
    fn to_canonical(&self, symbol: &Symbol) -> Symbol {
        let parts = SymbolParts::parse(symbol.as_str());
        let quote = parts.quote.unwrap_or_else(|| self.default_quote().to_string());
        Symbol::new(format!("{}_{}", parts.base, quote))
    }

    /// Structural check used to recognise "already native form" without allocating: compares
    /// separator placement/suffix shape rather than the literal base/quote strings.
    fn matches_shape(candidate: &str, probe_shape: &str) -> bool {
        let candidate_sep = candidate.find(['_', '-', '/']);
        let probe_sep = probe_shape.find(['_', '-', '/']);

        let same_separator = match (candidate_sep, probe_sep) {
            (Some(c), Some(p)) => candidate.as_bytes()[c] == probe_shape.as_bytes()[p],
            (None, None) => true,
            _ => false,
        };

        let candidate_suffix = candidate.rsplit(['_', '-']).next().unwrap_or("");
        let probe_suffix = probe_shape.rsplit(['_', '-']).next().unwrap_or("");
        let same_suffix_kind = candidate_suffix.eq_ignore_ascii_case(probe_suffix)
            || (!["PERP", "SWAP", "SPOT"]
                .iter()
                .any(|s| s.eq_ignore_ascii_case(candidate_suffix))
                && !["PERP", "SWAP", "SPOT"]
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(probe_suffix)));

        same_separator && same_suffix_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PerpUnderscore;

    impl SymbolTranslator for PerpUnderscore {
        fn default_quote(&self) -> &str {
            "USDC"
        }

        fn venue_form(&self, base: &str, quote: &str) -> Symbol {
            Symbol::new(format!("{base}_{quote}_PERP"))
        }
    }

    struct SwapDash;

    impl SymbolTranslator for SwapDash {
        fn default_quote(&self) -> &str {
            "USDT"
        }

        fn venue_form(&self, base: &str, quote: &str) -> Symbol {
            Symbol::new(format!("{base}-{quote}-SWAP"))
        }
    }

    #[test]
    fn parses_every_input_shape() {
        assert_eq!(
            SymbolParts::parse("ETH_USDC_PERP"),
            SymbolParts { base: "ETH".into(), quote: Some("USDC".into()) }
        );
        assert_eq!(
            SymbolParts::parse("ETH-USDT-SWAP"),
            SymbolParts { base: "ETH".into(), quote: Some("USDT".into()) }
        );
        assert_eq!(
            SymbolParts::parse("ETH/USDC"),
            SymbolParts { base: "ETH".into(), quote: Some("USDC".into()) }
        );
        assert_eq!(SymbolParts::parse("ETH"), SymbolParts { base: "ETH".into(), quote: None });
    }

    #[test]
    fn to_venue_is_idempotent_for_every_adapter_and_every_shape() {
        let perp = PerpUnderscore;
        let swap = SwapDash;

        for input in ["ETH", "ETH/USDC", "ETH-USDT-SWAP", "ETH_USDC_PERP"] {
            let symbol = Symbol::new(input);

            let once = perp.to_venue(&symbol);
            let twice = perp.to_venue(&once);
            assert_eq!(once, twice, "perp adapter not idempotent for {input}");

            let once = swap.to_venue(&symbol);
            let twice = swap.to_venue(&once);
            assert_eq!(once, twice, "swap adapter not idempotent for {input}");
        }
    }

    #[test]
    fn translates_across_adapter_native_forms() {
        let perp = PerpUnderscore;
        assert_eq!(perp.to_venue(&Symbol::new("ETH-USDT-SWAP")).as_str(), "ETH_USDT_PERP");
        assert_eq!(perp.to_venue(&Symbol::new("ETH")).as_str(), "ETH_USDC_PERP");

        let swap = SwapDash;
        assert_eq!(swap.to_venue(&Symbol::new("ETH_USDC_PERP")).as_str(), "ETH-USDC-SWAP");
    }

    #[test]
    fn to_canonical_roundtrips() {
        let perp = PerpUnderscore;
        let canonical = perp.to_canonical(&Symbol::new("ETH-USDT-SWAP"));
        assert_eq!(canonical.as_str(), "ETH_USDT");
        assert_eq!(perp.to_canonical(&canonical), canonical);
    }
}
