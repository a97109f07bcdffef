use chrono::NaiveDate;
use gridforge::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::io::Write;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn bill(on: NaiveDate, usage: f64, cost: f64) -> BillingRecord {
    BillingRecord {
        date: Some(on),
        year: Some(chrono::Datelike::year(&on)),
        usage: Some(usage),
        cost: Some(cost),
        ..BillingRecord::new("Oak Terrace", "Electricity")
    }
}

fn metered(meter: &str, usage: f64) -> BillingRecord {
    BillingRecord {
        meter_number: Some(meter.to_string()),
        usage: Some(usage),
        ..BillingRecord::new("Oak Terrace", "Electricity")
    }
}

#[test]
fn test_monthly_aggregate_preserves_months_and_usage() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let records: Vec<BillingRecord> = (0..rng.gen_range(1..60))
            .map(|_| {
                let on = date(
                    rng.gen_range(2020..2024),
                    rng.gen_range(1..=12),
                    rng.gen_range(1..=28),
                );
                let usage = rng.gen_range(0.0..5000.0);
                let mut record = bill(on, usage, usage * 0.12);
                if rng.gen_bool(0.1) {
                    record.usage = None;
                }
                record
            })
            .collect();

        let monthly = monthly_aggregate(&records);

        let distinct: BTreeSet<NaiveDate> = records
            .iter()
            .filter_map(|r| r.date.map(utils::month_start))
            .collect();
        assert_eq!(monthly.len(), distinct.len());
        assert!(monthly.windows(2).all(|w| w[0].month_start < w[1].month_start));

        let expected: f64 = records.iter().filter_map(|r| r.usage).sum();
        let actual: f64 = monthly.iter().map(|m| m.usage).sum();
        assert!((expected - actual).abs() < 1e-6 * expected.max(1.0));
    }
}

#[test]
fn test_efficiency_score_bounded_and_monotone() {
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..200 {
        let benchmark = rng.gen_range(1.0..10_000.0);
        let low = rng.gen_range(0.0..3.0 * benchmark);
        let high = low + rng.gen_range(0.0..benchmark);

        let low_score = efficiency_score(Some(low), Some(benchmark)).unwrap();
        let high_score = efficiency_score(Some(high), Some(benchmark)).unwrap();

        assert!((0.0..=100.0).contains(&low_score));
        assert!((0.0..=100.0).contains(&high_score));
        assert!(high_score <= low_score);
    }

    assert_eq!(efficiency_score(Some(100.0), Some(100.0)), Some(100.0));
    assert_eq!(efficiency_score(Some(150.0), Some(100.0)), Some(50.0));
    assert_eq!(efficiency_score(Some(250.0), Some(100.0)), Some(0.0));
}

#[test]
fn test_deviation_round_trip() {
    let mut rng = StdRng::seed_from_u64(13);

    for _ in 0..200 {
        let benchmark = rng.gen_range(0.5..50_000.0);
        let actual = rng.gen_range(0.0..100_000.0);

        let deviation = deviation_percent(Some(actual), Some(benchmark)).unwrap();
        let rebuilt = benchmark * (1.0 + deviation / 100.0);
        assert!((rebuilt - actual).abs() < 1e-6 * actual.max(1.0));
    }

    assert_eq!(deviation_percent(Some(10.0), Some(0.0)), None);
}

#[test]
fn test_missing_bill_reports_gap_months() {
    let records = vec![
        bill(date(2023, 1, 31), 100.0, 10.0),
        bill(date(2023, 3, 31), 100.0, 10.0),
        bill(date(2023, 4, 30), 100.0, 10.0),
    ];

    let missing: Vec<NaiveDate> = detect_missing_bills(&records)
        .into_iter()
        .map(|row| row.missing_month)
        .collect();
    assert_eq!(missing, vec![date(2023, 2, 1)]);
}

#[test]
fn test_spikes_only_on_increase() {
    let up = vec![
        bill(date(2023, 1, 1), 100.0, 10.0),
        bill(date(2023, 2, 1), 145.0, 14.5),
    ];
    let spikes = detect_spikes(&up, SpikeMetric::Usage, 40.0);
    assert_eq!(spikes.rows.len(), 1);
    assert!((spikes.rows[0].pct_change - 45.0).abs() < 1e-9);

    let down = vec![
        bill(date(2023, 1, 1), 100.0, 10.0),
        bill(date(2023, 2, 1), 60.0, 6.0),
    ];
    assert!(detect_spikes(&down, SpikeMetric::Usage, 40.0).is_empty());
}

#[test]
fn test_meter_outliers() {
    let totals = [
        ("M1", 100.0),
        ("M2", 100.0),
        ("M3", 100.0),
        ("M4", 100.0),
        ("M5", 1000.0),
    ];
    let five: Vec<BillingRecord> = totals
        .iter()
        .map(|(meter, usage)| metered(meter, *usage))
        .collect();

    // One outlier among five meters sits exactly two population deviations out.
    let flagged = detect_meter_anomalies(&five, 2.0);
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].meter_number, "M5");
    assert!((flagged[0].z_score - 2.0).abs() < 1e-9);

    let mut ten: Vec<BillingRecord> = (0..9).map(|i| metered(&format!("N{}", i), 100.0)).collect();
    ten.push(metered("N9", 1000.0));
    let flagged = detect_meter_anomalies(&ten, AlertThresholds::default().meter_z_threshold);
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].usage, 1000.0);

    let equal: Vec<BillingRecord> = (0..5).map(|i| metered(&format!("E{}", i), 300.0)).collect();
    assert!(detect_meter_anomalies(&equal, 2.5).is_empty());
}

#[test]
fn test_forecast_series_fills_gaps() {
    let records = vec![
        bill(date(2023, 1, 10), 500.0, 50.0),
        bill(date(2023, 4, 10), 700.0, 70.0),
    ];

    let (series, _) = prepare_monthly_series(&records);
    let months: Vec<NaiveDate> = series.iter().map(|p| p.ds).collect();
    assert_eq!(
        months,
        vec![date(2023, 1, 1), date(2023, 2, 1), date(2023, 3, 1), date(2023, 4, 1)]
    );
    let values: Vec<f64> = series.iter().map(|p| p.y).collect();
    assert_eq!(values, vec![500.0, 0.0, 0.0, 700.0]);
}

#[test]
fn test_merged_forecast_bounds() {
    let mut rng = StdRng::seed_from_u64(17);
    let records: Vec<BillingRecord> = (0..30u32)
        .map(|i| {
            let on = utils::add_months(date(2021, 1, 1), i).unwrap();
            let season = 400.0 * ((i % 12) as f64 - 6.0).abs();
            let usage = 2000.0 + season + rng.gen_range(-150.0..150.0);
            bill(on, usage, usage * 0.1)
        })
        .collect();

    let (series, _) = prepare_monthly_series(&records);
    let model = SeasonalDecomposition::default();
    let (forecast, _) = run_forecast(&model, &series, 12).unwrap();
    let merged = merge_actual_and_forecast(&series, &forecast);

    assert_eq!(merged.len(), 42);
    let months: BTreeSet<NaiveDate> = merged.iter().map(|row| row.ds).collect();
    assert_eq!(months.len(), merged.len());

    for row in &merged {
        assert!(row.yhat_lower <= row.yhat, "lower bound above estimate at {}", row.ds);
        assert!(row.yhat <= row.yhat_upper, "upper bound below estimate at {}", row.ds);
    }
    assert_eq!(merged.iter().filter(|row| row.actual.is_some()).count(), 30);
}

#[test]
fn test_end_to_end_from_csv() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("gridforge_e2e_{}.csv", std::process::id()));
    {
        let mut file = std::fs::File::create(&path)?;
        writeln!(
            file,
            "Property Name,Provider Code,# Units,Occupancy,Utility,Meter #,Billing Date,\
             Number Days Billed,Previous Reading,Current Reading,Usage,$ Amount"
        )?;
        for i in 0..14u32 {
            let on = utils::add_months(date(2022, 1, 1), i).unwrap();
            // March 2022 is never billed.
            if i == 2 {
                continue;
            }
            let usage = if i == 8 { 2600 } else { 1000 + (i % 12) * 20 };
            let days = if i == 5 { 45 } else { 30 };
            writeln!(
                file,
                "Oak Terrace,TXU,10,9,Electricity,M-1,{},{},{},{},{},\"${}\"",
                on.format("%m/%d/%Y"),
                days,
                i * 1000,
                i * 1000 + usage,
                usage,
                usage / 8
            )?;
        }
        writeln!(file, "Elm Court,ONCOR,4,4,Electricity,M-2,2022-01-15,30,0,500,500,70")?;
        writeln!(file, ",ONCOR,4,4,Gas,M-3,2022-01-15,30,0,10,10,7")?;
    }

    let config = AnalyticsConfig::default();
    let analyzer = BillingAnalyzer::new(&config);
    let records = analyzer.load(&path)?;
    std::fs::remove_file(&path)?;

    assert_eq!(records.len(), 14);
    assert_eq!(filter::properties(&records), vec!["Elm Court", "Oak Terrace"]);

    let slice = RecordFilter::new()
        .property("Oak Terrace")
        .utility("Electricity")
        .apply(&records);
    assert_eq!(slice.len(), 13);

    let report = analyzer.slice_report(&slice);
    assert_eq!(report.monthly.len(), 13);

    let missing: Vec<NaiveDate> = report
        .alerts
        .missing_bills
        .iter()
        .map(|r| r.missing_month)
        .collect();
    assert_eq!(missing, vec![date(2022, 3, 1)]);
    assert_eq!(report.alerts.irregular_billing.len(), 1);
    assert_eq!(report.alerts.spikes_usage.rows.len(), 1);
    assert_eq!(report.alerts.spikes_usage.rows[0].date, date(2022, 9, 1));
    assert!(report.alerts.bad_readings.is_empty());

    let benchmark = report.benchmark.as_ref().unwrap();
    assert_eq!(benchmark.benchmark_usage, Some(12_000.0));
    assert!(benchmark.efficiency_score.is_some());

    let forecast = report.forecast.report().unwrap();
    assert_eq!(forecast.forecast.len(), 14 + 12);
    let summary = forecast.summary.unwrap();
    assert_eq!(summary.benchmark, Some(12_000.0));
    assert_eq!(summary.direction(), Some("below"));

    let tables = alert_tables(&report.alerts)?;
    let (_, missing_csv) = tables.iter().find(|(name, _)| *name == "missing_bills").unwrap();
    assert_eq!(missing_csv, "missing_month\n2022-03-01\n");

    let monthly_csv = to_csv(&report.monthly)?;
    assert!(monthly_csv.starts_with("month_start,usage,cost,"));
    assert_eq!(monthly_csv.lines().count(), 14);

    let portfolio = analyzer.portfolio_report(&records);
    assert_eq!(portfolio.top_properties.rows[0].property, "Oak Terrace");
    assert_eq!(portfolio.providers.len(), 2);
    assert_eq!(portfolio.summary.unwrap().total_meters, Some(2));

    Ok(())
}
