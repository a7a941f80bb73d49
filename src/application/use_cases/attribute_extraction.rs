//! Best-effort field extraction from a raw record's attribute blob.
//!
//! Blobs are free text or loosely structured XML exported from accounting
//! systems, so every extractor tries keyword patterns first, then known XML
//! tags, then bare digit runs. Nothing here fails: a field that cannot be
//! found is `None`.

use once_cell::sync::Lazy;
use regex::Regex;

static INN_KEYWORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:инн|inn)[\s:]*(\d{10,12})").unwrap());
static KPP_KEYWORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:кпп|kpp)[\s:]*(\d{9})").unwrap());
static BIN_KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:бин|bin|бизнес[\s\-]*идентификационный[\s\-]*номер)[\s:]*(\d{12})")
        .unwrap()
});
static TEN_DIGITS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{10})(?:\D|$)").unwrap());
static TWELVE_DIGITS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{12})(?:\D|$)").unwrap());
static NINE_DIGITS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{9})(?:\D|$)").unwrap());
static LONG_DIGITS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{10,}").unwrap());

static INN_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    xml_tag_patterns(&[
        "ИНН",
        "ИННКонтрагента",
        "ИННЮридическогоЛица",
        "INN",
        "TaxID",
        "tax_id",
    ])
});
static BIN_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    xml_tag_patterns(&[
        "БИН",
        "БИНКонтрагента",
        "БИНЮридическогоЛица",
        "BIN",
        "БизнесИдентификационныйНомер",
        "BINNumber",
    ])
});
static ADDRESS_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    xml_tag_patterns(&[
        "Адрес",
        "АдресЮридический",
        "АдресПочтовый",
        "АдресФактический",
        "ЮридическийАдрес",
        "ПочтовыйАдрес",
        "ФактическийАдрес",
        "address",
        "legal_address",
        "postal_address",
        "actual_address",
    ])
});

static ADDRESS_KEYWORD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:юридический\s*адрес|адрес\s*юридический)[\s:>]*([^<]+)",
        r"(?i)(?:почтовый\s*адрес|адрес\s*почтовый)[\s:>]*([^<]+)",
        r"(?i)(?:фактический\s*адрес|адрес\s*фактический)[\s:>]*([^<]+)",
        r"(?i)адрес[\s:>]*([^<]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:телефон|phone|тел)[\s.:]*(\+?[\d\s\-()]{7,20})",
        r"(?i)(?:мобильный|mobile|сотовый)[\s:]*(\+?[\d\s\-()]{7,20})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static EMAIL_KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:email|e-mail|почта|электронная\s*почта)[\s:]*([a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,})",
    )
    .unwrap()
});
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").unwrap());
static CONTACT_PERSON_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:контактное\s*лицо|контактный|ответственное\s*лицо)[\s:]*([А-ЯЁа-яё ]{5,50})",
        r"(?i)(?:директор|руководитель|менеджер)[\s:]*([А-ЯЁа-яё ]{5,50})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const ADDRESS_CUT_MARKERS: [&str; 21] = [
    ", телефон",
    " телефон:",
    ",телефон",
    " тел.:",
    " tel",
    " phone",
    ", email",
    " email",
    ", e-mail",
    " e-mail",
    ", контакт",
    " контакт",
    ",контактное лицо",
    ", банк",
    " банк:",
    ",банк",
    " р/с",
    " к/с",
    " бик",
    " inn",
    " бин",
];

/// Minimum length for a candidate to count as an address.
const MIN_ADDRESS_CHARS: usize = 10;

/// Everything the adapter could pull out of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedAttributes {
    pub inn: Option<String>,
    pub kpp: Option<String>,
    pub bin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub contact_person: Option<String>,
}

pub fn extract_attributes(blob: &str) -> ExtractedAttributes {
    ExtractedAttributes {
        inn: extract_inn(blob),
        kpp: extract_kpp(blob),
        bin: extract_bin(blob),
        address: extract_address(blob),
        phone: extract_phone(blob),
        email: extract_email(blob),
        contact_person: extract_contact_person(blob),
    }
}

/// Russian taxpayer number: 10 digits for organisations, 12 for individuals.
pub fn extract_inn(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    if let Some(found) = first_capture(&INN_KEYWORD_PATTERN, text) {
        return Some(found);
    }
    if looks_like_xml(text) {
        let tagged = INN_TAGS
            .iter()
            .filter_map(|re| first_capture(re, text))
            .find(|value| is_digits(value, &[10, 12]));
        if tagged.is_some() {
            return tagged;
        }
    }
    if let Some(found) = first_capture(&TEN_DIGITS_PATTERN, text) {
        return Some(found);
    }

    // A longer run is only trusted when nothing marks it as a BIN
    let lower = text.to_lowercase();
    if lower.contains("бин") || lower.contains("bin") {
        return None;
    }
    LONG_DIGITS_PATTERN
        .find(text)
        .map(|m| m.as_str()[..10].to_string())
}

pub fn extract_kpp(text: &str) -> Option<String> {
    first_capture(&KPP_KEYWORD_PATTERN, text).or_else(|| first_capture(&NINE_DIGITS_PATTERN, text))
}

/// Kazakh business identification number, always 12 digits.
pub fn extract_bin(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    if let Some(found) = first_capture(&BIN_KEYWORD_PATTERN, text) {
        return Some(found);
    }
    if looks_like_xml(text) {
        let tagged = BIN_TAGS
            .iter()
            .filter_map(|re| first_capture(re, text))
            .find(|value| is_digits(value, &[12]));
        if tagged.is_some() {
            return tagged;
        }
    }
    let candidate = first_capture(&TWELVE_DIGITS_PATTERN, text)?;
    match extract_inn(text) {
        Some(inn) if inn == candidate => None,
        _ => Some(candidate),
    }
}

pub fn extract_address(text: &str) -> Option<String> {
    ADDRESS_KEYWORD_PATTERNS
        .iter()
        .chain(ADDRESS_TAGS.iter())
        .filter_map(|re| first_capture(re, text))
        .map(|raw| clean_address_tail(&raw))
        .find(|address| address.chars().count() > MIN_ADDRESS_CHARS)
}

pub fn extract_phone(text: &str) -> Option<String> {
    PHONE_PATTERNS
        .iter()
        .filter_map(|re| first_capture(re, text))
        .find(|phone| phone.chars().filter(char::is_ascii_digit).count() >= 7)
}

pub fn extract_email(text: &str) -> Option<String> {
    first_capture(&EMAIL_KEYWORD_PATTERN, text)
        .or_else(|| EMAIL_PATTERN.find(text).map(|m| m.as_str().to_string()))
        .map(|email| email.to_lowercase())
}

pub fn extract_contact_person(text: &str) -> Option<String> {
    CONTACT_PERSON_PATTERNS
        .iter()
        .filter_map(|re| first_capture(re, text))
        .find(|person| person.chars().count() >= 5)
}

fn xml_tag_patterns(fields: &[&str]) -> Vec<Regex> {
    fields
        .iter()
        .map(|field| {
            let field = regex::escape(field);
            Regex::new(&format!(r"(?i)<{field}[^>]*>([^<]+)</{field}>")).unwrap()
        })
        .collect()
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn looks_like_xml(text: &str) -> bool {
    text.contains('<') || text.contains('>')
}

fn is_digits(value: &str, lengths: &[usize]) -> bool {
    value.chars().all(|c| c.is_ascii_digit()) && lengths.contains(&value.len())
}

fn clean_address_tail(address: &str) -> String {
    let trimmed = address.trim();
    let lower = trimmed.to_lowercase();
    // Offsets found in the lowercased copy are only reused when they land on
    // a char boundary of the original
    let cut = ADDRESS_CUT_MARKERS
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()
        .filter(|&idx| lower.len() == trimmed.len() && trimmed.is_char_boundary(idx))
        .unwrap_or(trimmed.len());
    trimmed[..cut]
        .trim()
        .trim_end_matches([',', ';'])
        .trim()
        .to_string()
}
