//! Отчеты админки: выручка, рейтинг пользователей, брони по дням, история.
//!
//! Считается на каждом запросе по полному списку броней, без кеша.
//! Выручка брони = текущая цена позиции × число мест; бронь удаленной
//! позиции приносит 0.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{booking::BookingFact, CatalogItem};

const POPULAR_LIMIT: usize = 5;
const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub revenue: Decimal,
    pub bookings: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularItem {
    pub title: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentBooking {
    pub booking_id: i64,
    pub user_email: String,
    pub item_title: String,
    pub seat_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub total_users: i64,
    pub total_bookings: i64,
    pub total_revenue: Decimal,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub popular_items: Vec<PopularItem>,
    pub bookings_by_day: Vec<DailyCount>,
    pub recent_bookings: Vec<RecentBooking>,
}

fn booking_revenue(fact: &BookingFact) -> Decimal {
    fact.current_price
        .map(|price| price * Decimal::from(fact.seat_count))
        .unwrap_or(Decimal::ZERO)
}

pub fn dashboard(total_users: i64, facts: &[BookingFact]) -> DashboardReport {
    let mut total_revenue = Decimal::ZERO;
    let mut per_user: HashMap<i64, LeaderboardEntry> = HashMap::new();
    let mut per_title: HashMap<&str, i64> = HashMap::new();
    let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();

    for fact in facts {
        let revenue = booking_revenue(fact);
        total_revenue += revenue;

        let entry = per_user.entry(fact.user_id).or_insert_with(|| LeaderboardEntry {
            user_id: fact.user_id,
            email: fact.user_email.clone(),
            name: fact.user_name.clone(),
            revenue: Decimal::ZERO,
            bookings: 0,
        });
        entry.revenue += revenue;
        entry.bookings += 1;

        *per_title.entry(fact.item_title.as_str()).or_insert(0) += 1;
        *per_day.entry(fact.created_at.date()).or_insert(0) += 1;
    }

    let mut leaderboard: Vec<LeaderboardEntry> = per_user.into_values().collect();
    leaderboard.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then(b.bookings.cmp(&a.bookings))
            .then(a.user_id.cmp(&b.user_id))
    });

    let mut popular_items: Vec<PopularItem> = per_title
        .into_iter()
        .map(|(title, count)| PopularItem { title: title.to_string(), count })
        .collect();
    popular_items.sort_by(|a, b| b.count.cmp(&a.count).then(a.title.cmp(&b.title)));
    popular_items.truncate(POPULAR_LIMIT);

    let bookings_by_day = per_day
        .into_iter()
        .map(|(day, count)| DailyCount { day, count })
        .collect();

    let mut recent: Vec<&BookingFact> = facts.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.booking_id.cmp(&a.booking_id)));
    let recent_bookings = recent
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|f| RecentBooking {
            booking_id: f.booking_id,
            user_email: f.user_email.clone(),
            item_title: f.item_title.clone(),
            seat_count: f.seat_count,
            created_at: f.created_at,
        })
        .collect();

    DashboardReport {
        total_users,
        total_bookings: facts.len() as i64,
        total_revenue,
        leaderboard,
        popular_items,
        bookings_by_day,
        recent_bookings,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub item_id: i64,
    pub name: String,
    pub category: String,
    pub tickets_sold: usize,
    pub seats_booked: String,
    pub performance_date: NaiveDateTime,
}

/// История по позициям каталога (в порядке `items`): проданные билеты и места.
pub fn history(items: &[CatalogItem], sold_seats: &[(i64, String)]) -> Vec<HistoryEntry> {
    let mut seats_by_item: HashMap<i64, Vec<&str>> = HashMap::new();
    for (item_id, label) in sold_seats {
        seats_by_item.entry(*item_id).or_default().push(label.as_str());
    }

    items
        .iter()
        .map(|item| {
            let seats = seats_by_item.get(&item.id).map(Vec::as_slice).unwrap_or(&[]);
            HistoryEntry {
                item_id: item.id,
                name: item.title.clone(),
                category: item.category.clone(),
                tickets_sold: seats.len(),
                seats_booked: if seats.is_empty() {
                    "None".to_string()
                } else {
                    seats.join(", ")
                },
                performance_date: item.scheduled_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn fact(
        booking_id: i64,
        user_id: i64,
        title: &str,
        price: Option<i64>,
        seats: i64,
        created_at: NaiveDateTime,
    ) -> BookingFact {
        BookingFact {
            booking_id,
            user_id,
            user_email: format!("user{user_id}@test.local"),
            user_name: format!("User {user_id}"),
            catalog_item_id: price.map(|_| 1),
            item_title: title.to_string(),
            current_price: price.map(Decimal::from),
            seat_count: seats,
            created_at,
        }
    }

    #[test]
    fn revenue_is_price_times_seats_summed() {
        let facts = vec![
            fact(1, 1, "X", Some(500), 2, at(1, 10)),
            fact(2, 2, "Y", Some(300), 1, at(1, 12)),
            fact(3, 1, "Gone", None, 4, at(2, 9)),
        ];
        let report = dashboard(3, &facts);
        assert_eq!(report.total_revenue, Decimal::from(1300));
        assert_eq!(report.total_bookings, 3);
        assert_eq!(report.total_users, 3);
    }

    #[test]
    fn leaderboard_orders_by_revenue() {
        let facts = vec![
            fact(1, 1, "X", Some(100), 1, at(1, 10)),
            fact(2, 2, "X", Some(100), 3, at(1, 11)),
            fact(3, 1, "X", Some(100), 1, at(1, 12)),
        ];
        let report = dashboard(2, &facts);
        let order: Vec<(i64, Decimal, i64)> = report
            .leaderboard
            .iter()
            .map(|e| (e.user_id, e.revenue, e.bookings))
            .collect();
        assert_eq!(
            order,
            vec![(2, Decimal::from(300), 1), (1, Decimal::from(200), 2)]
        );
    }

    #[test]
    fn bookings_are_counted_per_day_in_order() {
        let facts = vec![
            fact(1, 1, "X", Some(1), 1, at(3, 10)),
            fact(2, 1, "X", Some(1), 1, at(1, 10)),
            fact(3, 1, "X", Some(1), 1, at(3, 23)),
        ];
        let report = dashboard(1, &facts);
        assert_eq!(
            report.bookings_by_day,
            vec![
                DailyCount { day: at(1, 0).date(), count: 1 },
                DailyCount { day: at(3, 0).date(), count: 2 },
            ]
        );
    }

    #[test]
    fn popular_items_top_five() {
        let mut facts = Vec::new();
        let mut id = 0;
        for (title, n) in [("A", 1), ("B", 5), ("C", 2), ("D", 3), ("E", 4), ("F", 2)] {
            for _ in 0..n {
                id += 1;
                facts.push(fact(id, 1, title, Some(1), 1, at(1, 10)));
            }
        }
        let report = dashboard(1, &facts);
        let titles: Vec<&str> = report.popular_items.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "E", "D", "C", "F"]);
        assert_eq!(report.recent_bookings.len(), 10);
        assert_eq!(report.recent_bookings[0].booking_id, id);
    }

    #[test]
    fn empty_ledger_yields_zeroes() {
        let report = dashboard(0, &[]);
        assert_eq!(report.total_revenue, Decimal::ZERO);
        assert!(report.leaderboard.is_empty());
        assert!(report.bookings_by_day.is_empty());
    }

    #[test]
    fn history_lists_seats_per_item() {
        let item = |id: i64, title: &str| CatalogItem {
            id,
            title: title.to_string(),
            genre: None,
            duration: "2h".into(),
            category: "Concert".into(),
            description: None,
            poster: None,
            price: Decimal::from(100),
            scheduled_at: at(20, 19),
        };
        let items = vec![item(1, "Free Rock Concert"), item(2, "Cold Play")];
        let sold = vec![(1, "A1".to_string()), (1, "A2".to_string())];

        let entries = history(&items, &sold);
        assert_eq!(entries[0].tickets_sold, 2);
        assert_eq!(entries[0].seats_booked, "A1, A2");
        assert_eq!(entries[1].tickets_sold, 0);
        assert_eq!(entries[1].seats_booked, "None");
    }
}
