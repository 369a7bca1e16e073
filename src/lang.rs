use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// MARC-3 language codes used by Open Library dumps, mapped to ISO 639-1.
/// Bibliographic and terminologic variants (e.g. "fre"/"fra") both appear in
/// the wild, so both are listed.
static MARC_TO_ISO: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    let pairs: &[(&str, &str)] = &[
        ("eng", "en"),
        ("fre", "fr"),
        ("fra", "fr"),
        ("ger", "de"),
        ("deu", "de"),
        ("spa", "es"),
        ("ita", "it"),
        ("por", "pt"),
        ("rus", "ru"),
        ("jpn", "ja"),
        ("chi", "zh"),
        ("zho", "zh"),
        ("kor", "ko"),
        ("ara", "ar"),
        ("hin", "hi"),
        ("tur", "tr"),
        ("pol", "pl"),
        ("dut", "nl"),
        ("nld", "nl"),
        ("swe", "sv"),
        ("nor", "no"),
        ("dan", "da"),
        ("fin", "fi"),
        ("gre", "el"),
        ("ell", "el"),
        ("heb", "he"),
        ("tha", "th"),
        ("vie", "vi"),
        ("ukr", "uk"),
        ("ces", "cs"),
        ("cze", "cs"),
        ("rum", "ro"),
        ("ron", "ro"),
        ("hun", "hu"),
        ("cat", "ca"),
        ("bul", "bg"),
        ("hrv", "hr"),
        ("srp", "sr"),
        ("slk", "sk"),
        ("slo", "sk"),
        ("slv", "sl"),
        ("lit", "lt"),
        ("lav", "lv"),
        ("est", "et"),
        ("ind", "id"),
        ("may", "ms"),
        ("msa", "ms"),
        ("per", "fa"),
        ("fas", "fa"),
        ("ben", "bn"),
        ("tam", "ta"),
        ("tel", "te"),
        ("mar", "mr"),
        ("guj", "gu"),
        ("kan", "kn"),
        ("mal", "ml"),
        ("pan", "pa"),
        ("urd", "ur"),
        ("lat", "la"),
        ("glg", "gl"),
        ("eus", "eu"),
        ("baq", "eu"),
        ("wel", "cy"),
        ("cym", "cy"),
        ("gle", "ga"),
        ("iri", "ga"),
        ("ice", "is"),
        ("isl", "is"),
        ("geo", "ka"),
        ("kat", "ka"),
        ("arm", "hy"),
        ("hye", "hy"),
        ("mac", "mk"),
        ("mkd", "mk"),
        ("alb", "sq"),
        ("sqi", "sq"),
        ("bos", "bs"),
        ("afr", "af"),
        ("swa", "sw"),
        ("amh", "am"),
        ("tgl", "tl"),
        ("fil", "tl"),
        ("mlt", "mt"),
    ];
    pairs.iter().copied().collect()
});

/// Resolves a MARC-3 code (e.g. "eng", "fre") to its ISO 639-1 code.
pub fn to_iso(marc: &str) -> Option<&'static str> {
    MARC_TO_ISO.get(marc).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_languages_mapped() {
        assert_eq!(to_iso("eng"), Some("en"));
        assert_eq!(to_iso("fre"), Some("fr"));
        assert_eq!(to_iso("ger"), Some("de"));
        assert_eq!(to_iso("spa"), Some("es"));
        assert_eq!(to_iso("jpn"), Some("ja"));
        assert_eq!(to_iso("chi"), Some("zh"));
        assert_eq!(to_iso("rus"), Some("ru"));
        assert_eq!(to_iso("ara"), Some("ar"));
        assert_eq!(to_iso("kor"), Some("ko"));
        assert_eq!(to_iso("pol"), Some("pl"));
    }

    #[test]
    fn bibliographic_and_terminologic_variants_agree() {
        for (a, b) in [
            ("fre", "fra"),
            ("ger", "deu"),
            ("chi", "zho"),
            ("dut", "nld"),
            ("cze", "ces"),
            ("rum", "ron"),
            ("baq", "eus"),
            ("wel", "cym"),
        ] {
            assert_eq!(to_iso(a), to_iso(b), "variants {a}/{b} diverge");
        }
    }

    #[test]
    fn all_values_are_two_letter_codes() {
        for (marc, iso) in MARC_TO_ISO.iter() {
            assert_eq!(iso.len(), 2, "ISO code for {marc} is not 2 chars: {iso}");
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(to_iso("zzz"), None);
        assert_eq!(to_iso(""), None);
    }
}
