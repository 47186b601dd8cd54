//! Static SQL template registry.
//!
//! One parameterized statement per (category, metric), loaded once and
//! never mutated at runtime. Placeholders use `:name` syntax and are
//! bound by the executor; any metric a classified intent carries has
//! been validated against the taxonomy, so a registry miss here means a
//! taxonomy/registry drift bug.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::intent::IntentCategory;

type TemplateKey = (IntentCategory, &'static str);

static REGISTRY: LazyLock<HashMap<TemplateKey, &'static str>> = LazyLock::new(|| {
    use IntentCategory::*;
    let mut m: HashMap<TemplateKey, &'static str> = HashMap::new();

    // ---- INVENTORY ----
    m.insert((Inventory, "stock_levels"),
        "SELECT p.sku, p.name, p.category, i.quantity_on_hand, i.reorder_point \
         FROM products p JOIN inventory i ON i.product_id = p.id \
         WHERE p.organization_id = :org_id \
         ORDER BY p.name");
    m.insert((Inventory, "low_stock"),
        "SELECT p.sku, p.name, i.quantity_on_hand, i.reorder_point \
         FROM products p JOIN inventory i ON i.product_id = p.id \
         WHERE p.organization_id = :org_id AND i.quantity_on_hand <= i.reorder_point \
         ORDER BY i.quantity_on_hand ASC");
    m.insert((Inventory, "product_movement"),
        "SELECT p.sku, p.name, sm.movement_type, sm.quantity, sm.moved_at AS date \
         FROM stock_movements sm JOIN products p ON p.id = sm.product_id \
         WHERE p.organization_id = :org_id AND sm.moved_at BETWEEN :start_date AND :end_date \
         ORDER BY sm.moved_at DESC");
    m.insert((Inventory, "inventory_value"),
        "SELECT SUM(i.quantity_on_hand * p.unit_price) AS total_value, COUNT(*) AS product_count \
         FROM products p JOIN inventory i ON i.product_id = p.id \
         WHERE p.organization_id = :org_id");
    m.insert((Inventory, "dead_stock"),
        "SELECT p.sku, p.name, i.quantity_on_hand, MAX(sm.moved_at) AS last_movement \
         FROM products p JOIN inventory i ON i.product_id = p.id \
         LEFT JOIN stock_movements sm ON sm.product_id = p.id \
         WHERE p.organization_id = :org_id \
         GROUP BY p.id HAVING last_movement IS NULL OR last_movement < :start_date");
    m.insert((Inventory, "org_structure"),
        "SELECT o.id, o.name, o.parent_id, COUNT(DISTINCT p.id) AS product_count \
         FROM organizations o LEFT JOIN products p ON p.organization_id = o.id \
         WHERE o.id = :org_id OR o.parent_id = :org_id \
         GROUP BY o.id ORDER BY o.parent_id, o.name");
    m.insert((Inventory, "bin_utilization"),
        "SELECT b.code, b.capacity, COUNT(u.id) AS units_stored, \
                CAST(COUNT(u.id) AS REAL) / b.capacity AS utilization \
         FROM storage_bins b LEFT JOIN inventory_units u ON u.bin_id = b.id \
         WHERE b.organization_id = :org_id \
         GROUP BY b.id ORDER BY utilization DESC");
    m.insert((Inventory, "unit_tracking"),
        "SELECT u.serial_number, p.sku, p.name, u.status, b.code AS bin_code, u.received_at \
         FROM inventory_units u JOIN products p ON p.id = u.product_id \
         LEFT JOIN storage_bins b ON b.id = u.bin_id \
         WHERE p.organization_id = :org_id AND u.serial_number = :serial_number");
    m.insert((Inventory, "alias_matching"),
        "SELECT p.sku, p.name, a.alias, a.match_confidence \
         FROM product_aliases a JOIN products p ON p.id = a.product_id \
         WHERE p.organization_id = :org_id AND a.alias LIKE :item_pattern \
           AND a.match_confidence >= :confidence_threshold \
         ORDER BY a.match_confidence DESC");

    // ---- SALES ----
    m.insert((Sales, "revenue"),
        "SELECT DATE(o.placed_at) AS date, SUM(o.total) AS revenue \
         FROM sales_orders o \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date \
         GROUP BY DATE(o.placed_at) ORDER BY date");
    m.insert((Sales, "sales_trends"),
        "SELECT DATE(o.placed_at) AS date, COUNT(*) AS orders, SUM(o.total) AS revenue \
         FROM sales_orders o \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date \
         GROUP BY DATE(o.placed_at) ORDER BY date");
    m.insert((Sales, "top_products"),
        "SELECT p.sku, p.name, SUM(li.quantity) AS units_sold, SUM(li.line_total) AS revenue \
         FROM sale_items li JOIN products p ON p.id = li.product_id \
         JOIN sales_orders o ON o.id = li.order_id \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date \
         GROUP BY p.id ORDER BY revenue DESC LIMIT 10");
    m.insert((Sales, "order_count"),
        "SELECT COUNT(*) AS order_count FROM sales_orders o \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date");
    m.insert((Sales, "average_order_value"),
        "SELECT AVG(o.total) AS average_order_value FROM sales_orders o \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date");
    m.insert((Sales, "top_customers"),
        "SELECT c.id, c.name, COUNT(o.id) AS orders, SUM(o.total) AS spend \
         FROM customers c JOIN sales_orders o ON o.customer_id = c.id \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date \
         GROUP BY c.id ORDER BY spend DESC LIMIT 10");
    m.insert((Sales, "repeat_rate"),
        "SELECT CAST(SUM(CASE WHEN order_count > 1 THEN 1 ELSE 0 END) AS REAL) / COUNT(*) AS repeat_rate \
         FROM (SELECT customer_id, COUNT(*) AS order_count FROM sales_orders \
               WHERE organization_id = :org_id AND placed_at BETWEEN :start_date AND :end_date \
               GROUP BY customer_id)");
    m.insert((Sales, "tax_collected"),
        "SELECT SUM(o.tax) AS tax_collected FROM sales_orders o \
         WHERE o.organization_id = :org_id AND o.placed_at BETWEEN :start_date AND :end_date");
    m.insert((Sales, "discount_totals"),
        "SELECT SUM(o.discount) AS discount_total, COUNT(*) AS discounted_orders \
         FROM sales_orders o \
         WHERE o.organization_id = :org_id AND o.discount > 0 \
           AND o.placed_at BETWEEN :start_date AND :end_date");

    // ---- APPOINTMENTS ----
    m.insert((Appointments, "upcoming_appointments"),
        "SELECT a.id, a.scheduled_at, a.service_type, c.name AS customer, t.name AS technician \
         FROM appointments a JOIN customers c ON c.id = a.customer_id \
         LEFT JOIN technicians t ON t.id = a.technician_id \
         WHERE a.organization_id = :org_id AND a.scheduled_at >= :end_date \
           AND a.status = 'scheduled' \
         ORDER BY a.scheduled_at LIMIT 20");
    m.insert((Appointments, "appointment_volume"),
        "SELECT DATE(a.scheduled_at) AS date, COUNT(*) AS appointments \
         FROM appointments a \
         WHERE a.organization_id = :org_id AND a.scheduled_at BETWEEN :start_date AND :end_date \
         GROUP BY DATE(a.scheduled_at) ORDER BY date");
    m.insert((Appointments, "no_show_rate"),
        "SELECT CAST(SUM(CASE WHEN a.status = 'no_show' THEN 1 ELSE 0 END) AS REAL) / COUNT(*) AS no_show_rate \
         FROM appointments a \
         WHERE a.organization_id = :org_id AND a.scheduled_at BETWEEN :start_date AND :end_date");
    m.insert((Appointments, "technician_load"),
        "SELECT t.name AS technician, COUNT(a.id) AS appointments \
         FROM technicians t LEFT JOIN appointments a ON a.technician_id = t.id \
           AND a.scheduled_at BETWEEN :start_date AND :end_date \
         WHERE t.organization_id = :org_id \
         GROUP BY t.id ORDER BY appointments DESC");

    // ---- PURCHASE_ORDERS ----
    m.insert((PurchaseOrders, "pending_orders"),
        "SELECT po.id, po.order_number, v.name AS vendor, po.total, po.expected_at \
         FROM purchase_orders po JOIN vendors v ON v.id = po.vendor_id \
         WHERE po.organization_id = :org_id AND po.status IN ('draft', 'pending', 'approved') \
         ORDER BY po.expected_at");
    m.insert((PurchaseOrders, "order_history"),
        "SELECT po.id, po.order_number, v.name AS vendor, po.status, po.total, po.created_at AS date \
         FROM purchase_orders po JOIN vendors v ON v.id = po.vendor_id \
         WHERE po.organization_id = :org_id AND po.created_at BETWEEN :start_date AND :end_date \
         ORDER BY po.created_at DESC");
    m.insert((PurchaseOrders, "incoming_stock"),
        "SELECT p.sku, p.name, SUM(poi.quantity) AS incoming_quantity, MIN(po.expected_at) AS earliest_arrival \
         FROM purchase_order_items poi JOIN purchase_orders po ON po.id = poi.purchase_order_id \
         JOIN products p ON p.id = poi.product_id \
         WHERE po.organization_id = :org_id AND po.status = 'approved' \
         GROUP BY p.id ORDER BY earliest_arrival");
    m.insert((PurchaseOrders, "vendor_performance"),
        "SELECT v.id, v.name, COUNT(po.id) AS orders, \
                AVG(JULIANDAY(po.received_at) - JULIANDAY(po.expected_at)) AS avg_delay_days \
         FROM vendors v JOIN purchase_orders po ON po.vendor_id = v.id \
         WHERE po.organization_id = :org_id AND po.status = 'received' \
           AND po.created_at BETWEEN :start_date AND :end_date \
         GROUP BY v.id ORDER BY avg_delay_days");
    m.insert((PurchaseOrders, "vendor_spend"),
        "SELECT v.id, v.name, SUM(po.total) AS spend, COUNT(po.id) AS orders \
         FROM vendors v JOIN purchase_orders po ON po.vendor_id = v.id \
         WHERE po.organization_id = :org_id AND po.created_at BETWEEN :start_date AND :end_date \
         GROUP BY v.id ORDER BY spend DESC");

    // ---- WARRANTIES ----
    m.insert((Warranties, "active_warranties"),
        "SELECT w.id, p.sku, p.name, c.name AS customer, w.starts_at, w.expires_at \
         FROM warranties w JOIN products p ON p.id = w.product_id \
         JOIN customers c ON c.id = w.customer_id \
         WHERE w.organization_id = :org_id AND w.expires_at > :end_date \
         ORDER BY w.expires_at");
    m.insert((Warranties, "expiring_warranties"),
        "SELECT w.id, p.sku, p.name, c.name AS customer, w.expires_at \
         FROM warranties w JOIN products p ON p.id = w.product_id \
         JOIN customers c ON c.id = w.customer_id \
         WHERE w.organization_id = :org_id AND w.expires_at BETWEEN :start_date AND :end_date \
         ORDER BY w.expires_at");
    m.insert((Warranties, "claim_rate"),
        "SELECT CAST(COUNT(DISTINCT cl.warranty_id) AS REAL) / COUNT(DISTINCT w.id) AS claim_rate \
         FROM warranties w LEFT JOIN warranty_claims cl ON cl.warranty_id = w.id \
         WHERE w.organization_id = :org_id");
    m.insert((Warranties, "warranty_cost"),
        "SELECT DATE(cl.filed_at) AS date, SUM(cl.cost) AS claim_cost, COUNT(*) AS claims \
         FROM warranty_claims cl JOIN warranties w ON w.id = cl.warranty_id \
         WHERE w.organization_id = :org_id AND cl.filed_at BETWEEN :start_date AND :end_date \
         GROUP BY DATE(cl.filed_at) ORDER BY date");

    m
});

/// Look up the statement for a category/metric pair.
pub fn template_for(category: IntentCategory, metric: &str) -> Option<&'static str> {
    REGISTRY.get(&(category, metric)).copied()
}
