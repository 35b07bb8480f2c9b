use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{BusinessType, ContactRecord};

// ── Lazy static regexes ──────────────────────────────────────────────────────

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap());

static WEBSITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:https?://[^\s,;]+|www\.[^\s,;]+|[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|net|org|io|co|biz|info|us|uk|ca|au|de|dev|app)\b(?:/[^\s,;]*)?)",
    )
    .unwrap()
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\(?\d[\d\s().-]{5,}\d").unwrap());

static POSTCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}-\d{4}\b").unwrap());

static FAX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfax\b|^\s*f\s*[:.]").unwrap());

static STREET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,6}\s+[a-z0-9 .'-]*\b(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|way|court|ct|place|pl|parkway|pkwy|highway|hwy|suite|ste|floor)\b",
    )
    .unwrap()
});

static PO_BOX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bp\.?\s*o\.?\s*box\s+\d+").unwrap());

static CITY_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z .'-]+,\s*[A-Za-z]{2,}\.?\s+[A-Z0-9]{3,5}(?:[- ][A-Z0-9]{3,4})?$").unwrap()
});

static COMPANY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:inc|llc|ltd|limited|corp|corporation|company|co|group|gmbh|plc|llp|pllc|associates|partners|studio|agency|solutions|services|enterprises|holdings)\b\.?",
    )
    .unwrap()
});

static NAME_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z'-]*\.?$").unwrap());

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:tel|phone|ph|mobile|mob|cell|office|direct|email|e-mail|web|website|t|m|e|w)\s*[:.]\s*")
        .unwrap()
});

const JOB_TITLE_WORDS: &[&str] = &[
    "manager", "director", "ceo", "cto", "cfo", "coo", "president", "founder", "owner",
    "engineer", "consultant", "agent", "sales", "officer", "partner", "attorney", "designer",
    "developer", "executive", "assistant", "representative", "specialist", "head", "lead",
    "vp", "chef", "broker", "realtor", "dds", "md",
];

static BUSINESS_KEYWORDS: Lazy<Vec<(BusinessType, Regex)>> = Lazy::new(|| {
    let table: &[(BusinessType, &str)] = &[
        (BusinessType::Restaurant, r"restaurant|cafe|café|bistro|grill|kitchen|catering|bakery|pizzeria|diner|bar"),
        (BusinessType::RealEstate, r"real\s+estate|realty|realtor|properties|property|broker|mortgage"),
        (BusinessType::Healthcare, r"clinic|medical|dental|dentist|health|hospital|pharmacy|physician|therapy|chiropractic|dds|md"),
        (BusinessType::Legal, r"law|legal|attorney|attorneys|lawyer|esq|solicitor|counsel"),
        (BusinessType::Construction, r"construction|contractor|contracting|builders|roofing|plumbing|electrical|remodeling"),
        (BusinessType::Technology, r"software|technology|technologies|tech|digital|cloud|systems|data"),
        (BusinessType::Finance, r"bank|financial|finance|accounting|accountant|cpa|insurance|investment|investments|wealth|capital"),
        (BusinessType::Education, r"school|academy|university|college|tutoring|education|institute|learning"),
        (BusinessType::Automotive, r"auto|automotive|motors|car|cars|garage|tires|collision|dealership"),
        (BusinessType::Beauty, r"salon|spa|beauty|barber|barbershop|nails|cosmetics|hair|lash"),
        (BusinessType::Retail, r"store|shop|boutique|retail|outlet|market|mart|supply"),
        (BusinessType::Consulting, r"consulting|consultant|consultants|advisory|advisors"),
    ];
    table
        .iter()
        .map(|(kind, words)| (*kind, Regex::new(&format!(r"(?i)\b(?:{})\b", words)).unwrap()))
        .collect()
});

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("field extraction failed: {0}")]
pub struct FieldError(pub String);

// ── Capability ───────────────────────────────────────────────────────────────

/// Derives contact fields from recognized card text.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<ContactRecord, FieldError>;
}

/// Regex and keyword heuristics tuned for printed business cards.
#[derive(Debug, Default, Clone)]
pub struct HeuristicExtractor;

impl FieldExtractor for HeuristicExtractor {
    fn extract(&self, text: &str) -> Result<ContactRecord, FieldError> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let email = find_email(text);
        let website = find_website(text);
        let phone = find_phone(&lines);
        let address = find_address(&lines);
        let company = find_company(&lines);
        let name = find_name(&lines, &company);

        Ok(ContactRecord {
            name,
            company,
            phone,
            email,
            website,
            address,
            business_type: classify(text),
        })
    }
}

// ── Field finders ────────────────────────────────────────────────────────────

fn find_email(text: &str) -> String {
    EMAIL_RE
        .find(text)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default()
}

fn find_website(text: &str) -> String {
    // Blank out emails so their domains are not mistaken for websites.
    let without_emails = EMAIL_RE.replace_all(text, " ");
    WEBSITE_RE
        .find(&without_emails)
        .map(|m| {
            m.as_str()
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | ';' | ':'))
                .to_string()
        })
        .unwrap_or_default()
}

fn find_phone(lines: &[&str]) -> String {
    for line in lines {
        if FAX_RE.is_match(line) || EMAIL_RE.is_match(line) {
            continue;
        }
        if let Some(phone) = phone_runs(line)
            .into_iter()
            .find(|run| (7..=15).contains(&digit_count(run)))
        {
            return phone;
        }
    }
    String::new()
}

fn find_address(lines: &[&str]) -> String {
    for (idx, line) in lines.iter().enumerate() {
        let street = STREET_RE.is_match(line) || PO_BOX_RE.is_match(line);
        if street && !EMAIL_RE.is_match(line) {
            let mut address = strip_label(line).to_string();
            if let Some(next) = lines.get(idx + 1) {
                if CITY_LINE_RE.is_match(next) {
                    address.push_str(", ");
                    address.push_str(next);
                }
            }
            return address;
        }
        if is_contact_line(line) {
            continue;
        }
        if CITY_LINE_RE.is_match(line) {
            return line.to_string();
        }
    }
    String::new()
}

fn find_company(lines: &[&str]) -> String {
    lines
        .iter()
        .find(|line| {
            !is_contact_line(line)
                && !STREET_RE.is_match(line)
                && !line.chars().any(|c| c.is_ascii_digit())
                && COMPANY_RE.is_match(line)
        })
        .map(|line| line.to_string())
        .unwrap_or_default()
}

fn find_name(lines: &[&str], company: &str) -> String {
    lines
        .iter()
        .find(|line| {
            let words: Vec<&str> = line.split_whitespace().collect();
            (2..=4).contains(&words.len())
                && **line != company
                && !is_contact_line(line)
                && !COMPANY_RE.is_match(line)
                && !is_job_title(&words)
                && words.iter().all(|w| NAME_WORD_RE.is_match(w) || is_all_caps_word(w))
        })
        .map(|line| line.to_string())
        .unwrap_or_default()
}

/// Most keyword hits wins, earlier rows break ties. Contact lines are left out
/// so labels and domains ("Web:", "www.") never vote.
fn classify(text: &str) -> BusinessType {
    let body = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_contact_line(l))
        .collect::<Vec<_>>()
        .join("\n");

    let mut best = (0, BusinessType::Other);
    for (kind, re) in BUSINESS_KEYWORDS.iter() {
        let hits = re.find_iter(&body).count();
        if hits > best.0 {
            best = (hits, *kind);
        }
    }
    best.1
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn is_contact_line(line: &str) -> bool {
    EMAIL_RE.is_match(line)
        || line.to_lowercase().contains("www.")
        || line.contains("://")
        || LABEL_RE.is_match(line)
        || phone_runs(line).iter().any(|run| digit_count(run) >= 7)
}

/// Phone-shaped digit runs, with ZIP+4 postcodes blanked out first.
fn phone_runs(line: &str) -> Vec<String> {
    let line = POSTCODE_RE.replace_all(line, " ");
    PHONE_RE
        .find_iter(&line)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(char::is_ascii_digit).count()
}

fn strip_label(line: &str) -> &str {
    match LABEL_RE.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

fn is_job_title(words: &[&str]) -> bool {
    words.iter().any(|w| {
        let w = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        JOB_TITLE_WORDS.contains(&w.as_str())
    })
}

fn is_all_caps_word(word: &str) -> bool {
    word.len() > 1
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || matches!(c, '\'' | '-' | '.'))
}
