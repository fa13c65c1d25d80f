//! Google Calendar API client.
//!
//! Lists every calendar the user can read, then fetches the expanded
//! (single) events of each one inside a time window.

use chrono::{DateTime, NaiveDate, Utc};
use postmeeting_core::TimeWindow;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::GoogleConfig;
use crate::error::ProviderResult;
use crate::http;
use crate::provider::{BoxFuture, CalendarEvent, CalendarSource};

/// Calendar reader for Google accounts.
#[derive(Debug, Clone)]
pub struct GoogleCalendar {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

impl GoogleCalendar {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = http::build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> ProviderResult<T> {
        let (status, body) = http::execute(request)
            .await
            .map_err(|e| e.with_provider("google"))?;

        if !status.is_success() {
            let detail = super::error_message(&body).unwrap_or_else(|| http::snippet(&body));
            let message = format!("{} failed ({}): {}", what, status, detail);
            return Err(http::status_error(status, message).with_provider("google"));
        }

        http::parse_json(&body, what).map_err(|e| e.with_provider("google"))
    }

    /// Lists the calendars the user can at least read.
    pub async fn list_calendars(
        &self,
        access_token: &str,
    ) -> ProviderResult<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.config.api_base);
        let request = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("minAccessRole", "reader")]);

        let list: CalendarListResponse = self.get_json(request, "calendar list").await?;
        Ok(list.items)
    }

    async fn list_calendar_events(
        &self,
        access_token: &str,
        calendar: &CalendarListEntry,
        window: TimeWindow,
    ) -> ProviderResult<Vec<CalendarEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.config.api_base,
            urlencoding::encode(&calendar.id)
        );
        let request = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", window.start.to_rfc3339()),
                ("timeMax", window.end.to_rfc3339()),
                ("maxResults", self.config.max_results_per_calendar.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ]);

        let response: EventListResponse = self.get_json(request, "event list").await?;
        Ok(response
            .items
            .into_iter()
            .filter_map(|event| convert_event(event, calendar))
            .collect())
    }

    async fn fetch_all(
        &self,
        access_token: &str,
        window: TimeWindow,
    ) -> ProviderResult<Vec<CalendarEvent>> {
        let calendars = self.list_calendars(access_token).await?;
        let mut events = Vec::new();

        for calendar in calendars.iter().filter(|c| !c.id.is_empty()) {
            match self.list_calendar_events(access_token, calendar, window).await {
                Ok(mut found) => {
                    debug!(calendar = %calendar.id, count = found.len(), "fetched events");
                    events.append(&mut found);
                }
                Err(e) => {
                    warn!(calendar = %calendar.id, error = %e, "skipping calendar");
                }
            }
        }

        Ok(events)
    }
}

impl CalendarSource for GoogleCalendar {
    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(self.fetch_all(access_token, window))
    }
}

/// Converts an API event, skipping cancelled or malformed ones.
fn convert_event(event: ApiEvent, calendar: &CalendarListEntry) -> Option<CalendarEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id?;
    let Some(start) = event.start.as_ref().and_then(ApiEventTime::to_utc) else {
        warn!(event = %id, "event has no usable start time");
        return None;
    };
    let end = event
        .end
        .as_ref()
        .and_then(ApiEventTime::to_utc)
        .unwrap_or(start);

    let attendees = event
        .attendees
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| a.email)
        .collect();

    Some(CalendarEvent {
        id,
        calendar_id: calendar.id.clone(),
        calendar_name: calendar.summary.clone(),
        title: event
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Untitled Meeting".to_string()),
        start,
        end,
        hangout_link: event.hangout_link,
        location: event.location,
        description: event.description,
        attendees,
    })
}

/// Response from the calendarList.list endpoint.
#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

/// A calendar from the user's calendar list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    #[serde(default)]
    pub id: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub access_role: Option<String>,
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    hangout_link: Option<String>,
    start: Option<ApiEventTime>,
    end: Option<ApiEventTime>,
    attendees: Option<Vec<ApiAttendee>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl ApiEventTime {
    /// Timed events use `dateTime`; all-day events use `date` at midnight UTC.
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| warn!("failed to parse event time {}: {}", dt, e))
                .ok();
        }
        let date = self.date.as_ref()?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| warn!("failed to parse event date {}: {}", date, e))
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Deserialize)]
struct ApiAttendee {
    email: Option<String>,
}
