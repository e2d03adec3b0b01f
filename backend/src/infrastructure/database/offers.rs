use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{query, query_as, query_scalar, Pool, Postgres, QueryBuilder};

use crate::domain::offer::{
    NewOffer, NewStock, Offer, OffererStatistics, PriceCategory, Product, Stock, StockUpdate,
};
use crate::infrastructure::error::{AppError, AppResult};

pub(crate) const OFFER_COLUMNS: &str = "id, venue_id, product_id, name, subcategory_id, is_active, is_event, \
     id_at_provider, last_provider_id, date_created, date_updated";
pub(crate) const STOCK_COLUMNS: &str = "id, offer_id, price, quantity, dn_booked_quantity, beginning_datetime, \
     booking_limit_datetime, price_category_id, id_at_providers, raw_provider_quantity, \
     last_provider_id, is_soft_deleted, date_modified";

/// Produits, offres et stocks
#[async_trait]
pub trait OfferRepository: Send + Sync {
    async fn get_offer(&self, offer_id: i64) -> AppResult<Offer>;
    async fn get_stock(&self, stock_id: i64) -> AppResult<Stock>;

    async fn find_products_by_eans(&self, eans: &[String]) -> AppResult<Vec<Product>>;
    /// Offres d'un lieu dont l'identifiant fournisseur figure dans `references`
    async fn find_offers_by_provider_references(
        &self,
        venue_id: i64,
        references: &[String],
    ) -> AppResult<Vec<Offer>>;
    async fn find_stocks_by_provider_references(&self, references: &[String])
        -> AppResult<Vec<Stock>>;

    /// Insère un lot d'offres ; le lot est entièrement annulé en cas d'erreur
    async fn create_offers(&self, offers: &[NewOffer]) -> AppResult<Vec<Offer>>;
    /// Insère un lot de stocks ; le lot est entièrement annulé en cas d'erreur
    async fn create_stocks(&self, stocks: &[NewStock]) -> AppResult<Vec<Stock>>;
    async fn update_stocks(&self, updates: &[StockUpdate]) -> AppResult<()>;

    async fn find_or_create_price_category(
        &self,
        offer_id: i64,
        label: &str,
        price: Decimal,
    ) -> AppResult<PriceCategory>;

    async fn offerer_statistics(&self, offerer_id: i64) -> AppResult<OffererStatistics>;
}

#[derive(Clone)]
pub struct PgOfferRepository {
    pool: Pool<Postgres>,
}

impl PgOfferRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferRepository for PgOfferRepository {
    async fn get_offer(&self, offer_id: i64) -> AppResult<Offer> {
        query_as::<_, Offer>(&format!("SELECT {} FROM offer WHERE id = $1", OFFER_COLUMNS))
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Offre {}", offer_id)))
    }

    async fn get_stock(&self, stock_id: i64) -> AppResult<Stock> {
        query_as::<_, Stock>(&format!("SELECT {} FROM stock WHERE id = $1", STOCK_COLUMNS))
            .bind(stock_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock {}", stock_id)))
    }

    async fn find_products_by_eans(&self, eans: &[String]) -> AppResult<Vec<Product>> {
        let products = query_as::<_, Product>(
            "SELECT id, ean, name, subcategory_id, price FROM product WHERE ean = ANY($1)",
        )
        .bind(eans)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    async fn find_offers_by_provider_references(
        &self,
        venue_id: i64,
        references: &[String],
    ) -> AppResult<Vec<Offer>> {
        let offers = query_as::<_, Offer>(&format!(
            "SELECT {} FROM offer WHERE venue_id = $1 AND id_at_provider = ANY($2)",
            OFFER_COLUMNS
        ))
        .bind(venue_id)
        .bind(references)
        .fetch_all(&self.pool)
        .await?;
        Ok(offers)
    }

    async fn find_stocks_by_provider_references(
        &self,
        references: &[String],
    ) -> AppResult<Vec<Stock>> {
        let stocks = query_as::<_, Stock>(&format!(
            "SELECT {} FROM stock WHERE id_at_providers = ANY($1)",
            STOCK_COLUMNS
        ))
        .bind(references)
        .fetch_all(&self.pool)
        .await?;
        Ok(stocks)
    }

    async fn create_offers(&self, offers: &[NewOffer]) -> AppResult<Vec<Offer>> {
        if offers.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO offer (venue_id, product_id, name, subcategory_id, is_event, \
             id_at_provider, last_provider_id) ",
        );
        builder.push_values(offers, |mut row, offer| {
            row.push_bind(offer.venue_id)
                .push_bind(offer.product_id)
                .push_bind(&offer.name)
                .push_bind(&offer.subcategory_id)
                .push_bind(offer.is_event)
                .push_bind(&offer.id_at_provider)
                .push_bind(offer.last_provider_id);
        });
        builder.push(" RETURNING ").push(OFFER_COLUMNS);

        let created = builder.build_query_as::<Offer>().fetch_all(&self.pool).await?;
        Ok(created)
    }

    async fn create_stocks(&self, stocks: &[NewStock]) -> AppResult<Vec<Stock>> {
        if stocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO stock (offer_id, price, quantity, beginning_datetime, \
             booking_limit_datetime, price_category_id, id_at_providers, \
             raw_provider_quantity, last_provider_id) ",
        );
        builder.push_values(stocks, |mut row, stock| {
            row.push_bind(stock.offer_id)
                .push_bind(stock.price)
                .push_bind(stock.quantity)
                .push_bind(stock.beginning_datetime)
                .push_bind(stock.booking_limit_datetime)
                .push_bind(stock.price_category_id)
                .push_bind(&stock.id_at_providers)
                .push_bind(stock.raw_provider_quantity)
                .push_bind(stock.last_provider_id);
        });
        builder.push(" RETURNING ").push(STOCK_COLUMNS);

        let created = builder.build_query_as::<Stock>().fetch_all(&self.pool).await?;
        Ok(created)
    }

    async fn update_stocks(&self, updates: &[StockUpdate]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for update in updates {
            query(
                r#"
                UPDATE stock
                SET quantity = $2,
                    raw_provider_quantity = $3,
                    price = $4,
                    beginning_datetime = COALESCE($5, beginning_datetime),
                    price_category_id = COALESCE($6, price_category_id),
                    last_provider_id = $7,
                    date_modified = NOW()
                WHERE id = $1
                "#,
            )
            .bind(update.stock_id)
            .bind(update.quantity)
            .bind(update.raw_provider_quantity)
            .bind(update.price)
            .bind(update.beginning_datetime)
            .bind(update.price_category_id)
            .bind(update.last_provider_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_or_create_price_category(
        &self,
        offer_id: i64,
        label: &str,
        price: Decimal,
    ) -> AppResult<PriceCategory> {
        let existing = query_as::<_, PriceCategory>(
            "SELECT id, offer_id, label, price FROM price_category \
             WHERE offer_id = $1 AND label = $2 AND price = $3",
        )
        .bind(offer_id)
        .bind(label)
        .bind(price)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(category) = existing {
            return Ok(category);
        }

        let category = query_as::<_, PriceCategory>(
            r#"
            INSERT INTO price_category (offer_id, label, price)
            VALUES ($1, $2, $3)
            RETURNING id, offer_id, label, price
            "#,
        )
        .bind(offer_id)
        .bind(label)
        .bind(price)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn offerer_statistics(&self, offerer_id: i64) -> AppResult<OffererStatistics> {
        let active_offers_count: i64 = query_scalar(
            r#"
            SELECT COUNT(*) FROM offer o
            JOIN venue v ON v.id = o.venue_id
            WHERE v.offerer_id = $1 AND o.is_active
            "#,
        )
        .bind(offerer_id)
        .fetch_one(&self.pool)
        .await?;

        let (bookings_count, used_bookings_count, revenue): (i64, i64, Decimal) = query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status <> 'CANCELLED'),
                COUNT(*) FILTER (WHERE status IN ('USED', 'REIMBURSED')),
                COALESCE(SUM(amount * quantity) FILTER (WHERE status IN ('USED', 'REIMBURSED')), 0)
            FROM booking
            WHERE offerer_id = $1
            "#,
        )
        .bind(offerer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(OffererStatistics {
            active_offers_count,
            bookings_count,
            used_bookings_count,
            revenue,
        })
    }
}
