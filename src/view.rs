//! Table view — sortable, paginated rows with category/reply badges,
//! rendered as plain text for the terminal.

use std::cmp::Ordering;
use std::fmt::Display;

use chrono::{Local, TimeZone};
use crossterm::style::{Color, Stylize};

use crate::model::Email;
use crate::session::SessionSnapshot;

/// Characters of body text shown in the Text column.
pub const TEXT_PREVIEW_CHARS: usize = 80;

/// Label shown in the Suggested Reply column before enrichment lands.
pub const REPLY_PLACEHOLDER: &str = "Loading..";

/// Label shown in the Category column before enrichment lands.
pub const CATEGORY_PLACEHOLDER: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Subject,
    From,
    To,
    Date,
    Text,
    Category,
    SuggestedReply,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Self::Subject,
        Self::From,
        Self::To,
        Self::Date,
        Self::Text,
        Self::Category,
        Self::SuggestedReply,
    ];

    pub const fn title(&self) -> &'static str {
        match self {
            Self::Subject => "Subject",
            Self::From => "From",
            Self::To => "To",
            Self::Date => "Date",
            Self::Text => "Text",
            Self::Category => "Category",
            Self::SuggestedReply => "Suggested Reply",
        }
    }

    /// Every column but Text can be sorted.
    pub const fn sortable(&self) -> bool {
        !matches!(self, Self::Text)
    }

    /// Display width in the rendered table.
    const fn width(&self) -> usize {
        match self {
            Self::Subject => 24,
            Self::From | Self::To => 20,
            Self::Date => 23,
            Self::Text => 32,
            Self::Category => 15,
            Self::SuggestedReply => 28,
        }
    }

    /// Parse a column name as typed by the user ("subject", "reply", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "subject" => Some(Self::Subject),
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            "date" => Some(Self::Date),
            "text" => Some(Self::Text),
            "category" => Some(Self::Category),
            "reply" | "suggested-reply" | "suggested_reply" => Some(Self::SuggestedReply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Badge colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTone {
    Yellow,
    Blue,
    Red,
    Gray,
}

impl BadgeTone {
    fn color(&self) -> Color {
        match self {
            Self::Yellow => Color::Yellow,
            Self::Blue => Color::Blue,
            Self::Red => Color::Red,
            Self::Gray => Color::Grey,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub label: String,
    pub tone: BadgeTone,
}

/// Badge for the Category column, coloured by fixed keyword.
pub fn category_badge(category: Option<&str>) -> Badge {
    let Some(category) = category.filter(|c| !c.is_empty()) else {
        return Badge {
            label: CATEGORY_PLACEHOLDER.to_string(),
            tone: BadgeTone::Gray,
        };
    };
    let tone = match category {
        "Out of Office" => BadgeTone::Yellow,
        "Meeting" => BadgeTone::Blue,
        "Spam" => BadgeTone::Red,
        _ => BadgeTone::Gray,
    };
    Badge {
        label: category.to_string(),
        tone,
    }
}

/// Badge for the Suggested Reply column. Replies are free text, so always gray.
pub fn reply_badge(reply: Option<&str>) -> Badge {
    Badge {
        label: reply
            .filter(|r| !r.is_empty())
            .unwrap_or(REPLY_PLACEHOLDER)
            .to_string(),
        tone: BadgeTone::Gray,
    }
}

/// First 80 characters of the body followed by `...`.
pub fn text_preview(text: &str) -> String {
    let head: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
    format!("{head}...")
}

/// Date in the given time zone, e.g. `1/1/2024, 10:00:00 AM`.
///
/// Unparseable dates are shown verbatim.
pub fn format_date<Tz>(email: &Email, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match email.parsed_date() {
        Some(dt) => dt
            .with_timezone(tz)
            .format("%-m/%-d/%Y, %-I:%M:%S %p")
            .to_string(),
        None => email.date.clone(),
    }
}

/// One display row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub text: String,
    pub category: Badge,
    pub reply: Badge,
}

impl Row {
    pub fn from_email<Tz>(email: &Email, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            subject: email.subject.clone(),
            from: email.from.clone(),
            to: email.to.clone(),
            date: format_date(email, tz),
            text: text_preview(&email.text),
            category: category_badge(email.category.as_deref()),
            reply: reply_badge(email.reply.as_deref()),
        }
    }
}

/// Sort and pagination state for the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub sort_column: Column,
    pub sort_direction: SortDirection,
    pub page: usize,
    pub page_size: usize,
}

impl TableView {
    /// Newest first, first page.
    pub fn new(page_size: usize) -> Self {
        Self {
            sort_column: Column::Date,
            sort_direction: SortDirection::Descending,
            page: 0,
            page_size: page_size.max(1),
        }
    }

    /// Change the sort. Returns `false` for unsortable columns.
    pub fn sort_by(&mut self, column: Column, direction: SortDirection) -> bool {
        if !column.sortable() {
            return false;
        }
        self.sort_column = column;
        self.sort_direction = direction;
        self.page = 0;
        true
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size).max(1)
    }

    /// Jump to a page, clamped to the last one.
    pub fn set_page(&mut self, page: usize, total: usize) {
        self.page = page.min(self.page_count(total) - 1);
    }

    pub fn next_page(&mut self, total: usize) {
        self.set_page(self.page.saturating_add(1), total);
    }

    pub fn prev_page(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    /// All emails in display order.
    pub fn sorted<'a>(&self, emails: &'a [Email]) -> Vec<&'a Email> {
        let mut out: Vec<&Email> = emails.iter().collect();
        let column = self.sort_column;
        out.sort_by(|a, b| {
            let ord = compare(column, a, b);
            match self.sort_direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
        out
    }

    /// Rows of the current page, in display order.
    pub fn page_rows<Tz>(&self, emails: &[Email], tz: &Tz) -> Vec<Row>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let page = self.page.min(self.page_count(emails.len()) - 1);
        self.sorted(emails)
            .into_iter()
            .skip(page * self.page_size)
            .take(self.page_size)
            .map(|email| Row::from_email(email, tz))
            .collect()
    }
}

fn compare(column: Column, a: &Email, b: &Email) -> Ordering {
    fn text(a: &str, b: &str) -> Ordering {
        a.to_lowercase().cmp(&b.to_lowercase())
    }

    match column {
        Column::Subject => text(&a.subject, &b.subject),
        Column::From => text(&a.from, &b.from),
        Column::To => text(&a.to, &b.to),
        Column::Date => a
            .parsed_date()
            .map(|d| d.timestamp_millis())
            .cmp(&b.parsed_date().map(|d| d.timestamp_millis())),
        Column::Text => Ordering::Equal,
        Column::Category => text(
            &category_badge(a.category.as_deref()).label,
            &category_badge(b.category.as_deref()).label,
        ),
        Column::SuggestedReply => text(
            &reply_badge(a.reply.as_deref()).label,
            &reply_badge(b.reply.as_deref()).label,
        ),
    }
}

/// Pad or cut `s` to exactly `width` characters.
fn fit(s: &str, width: usize) -> String {
    let s = s.replace(['\n', '\r', '\t'], " ");
    let count = s.chars().count();
    if count <= width {
        format!("{s:width$}")
    } else if width < 4 {
        s.chars().take(width).collect()
    } else {
        let cut: String = s.chars().take(width - 3).collect();
        format!("{cut}...")
    }
}

fn badge_cell(badge: &Badge, width: usize) -> String {
    fit(&badge.label, width)
        .with(badge.tone.color())
        .bold()
        .to_string()
}

/// Render the whole screen: header, filters, error banner, table, pager.
pub fn render(snapshot: &SessionSnapshot, view: &TableView) -> String {
    render_in(snapshot, view, &Local)
}

/// `render` with an explicit time zone for the Date column.
pub fn render_in<Tz>(snapshot: &SessionSnapshot, view: &TableView, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    out.push_str("📧 Emails\n");

    let filters = &snapshot.filters;
    if filters.is_empty() {
        out.push_str("Filters: (none)\n");
    } else {
        let active: Vec<String> = crate::model::FilterField::ALL
            .iter()
            .filter(|f| !filters.get(**f).is_empty())
            .map(|f| format!("{}: {:?}", f.label(), filters.get(*f)))
            .collect();
        out.push_str(&format!("Filters: {}\n", active.join(", ")));
    }

    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!("{}\n", format!("⚠ {error}").red().bold()));
    }

    let header: Vec<String> = Column::ALL
        .iter()
        .map(|c| {
            let mut title = c.title().to_string();
            if *c == view.sort_column {
                title.push_str(match view.sort_direction {
                    SortDirection::Ascending => " ▲",
                    SortDirection::Descending => " ▼",
                });
            }
            fit(&title, c.width())
        })
        .collect();
    out.push_str(&header.join(" │ "));
    out.push('\n');

    let rule: Vec<String> = Column::ALL.iter().map(|c| "─".repeat(c.width())).collect();
    out.push_str(&rule.join("─┼─"));
    out.push('\n');

    let rows = view.page_rows(&snapshot.emails, tz);
    if rows.is_empty() {
        out.push_str("No emails.\n");
    }
    for row in &rows {
        let cells = [
            fit(&row.subject, Column::Subject.width()),
            fit(&row.from, Column::From.width()),
            fit(&row.to, Column::To.width()),
            fit(&row.date, Column::Date.width()),
            fit(&row.text, Column::Text.width()),
            badge_cell(&row.category, Column::Category.width()),
            badge_cell(&row.reply, Column::SuggestedReply.width()),
        ];
        out.push_str(&cells.join(" │ "));
        out.push('\n');
    }

    let total = snapshot.emails.len();
    out.push_str(&format!(
        "Page {}/{} · {} email(s)\n",
        view.page.min(view.page_count(total) - 1) + 1,
        view.page_count(total),
        total
    ));
    out
}
