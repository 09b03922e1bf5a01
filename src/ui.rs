use crate::models::{Difficulty, ProgressResponse, StageRecord};

pub fn render_index(progress: &ProgressResponse, stages: &[StageRecord]) -> String {
    let stats = &progress.stats;
    let rows: String = stages
        .iter()
        .map(|stage| render_stage(stage, progress))
        .collect();

    INDEX_HTML
        .replace("{{COMPLETED}}", &stats.completed.to_string())
        .replace("{{TOTAL}}", &stats.total.to_string())
        .replace("{{PERCENT}}", &stats.percentage.to_string())
        .replace("{{DISTANCE}}", &format!("{:.1}", stats.cumulative_distance_km))
        .replace("{{GAIN}}", &stats.cumulative_elevation_gain_m.to_string())
        .replace("{{NEXT}}", &progress.next_eligible_day.to_string())
        .replace("{{ROWS}}", &rows)
}

fn render_stage(stage: &StageRecord, progress: &ProgressResponse) -> String {
    let done = progress.completed_days.contains(&stage.day);
    let eligible = done || stage.day == progress.next_eligible_day;
    let (class, label) = match (done, eligible) {
        (true, _) => ("done", "Annuler"),
        (false, true) => ("next", "Valider"),
        (false, false) => ("locked", "Valider"),
    };

    format!(
        r#"<li class="stage {class}">
        <span class="day">J{day}</span>
        <span class="route">{from} → {to}<small>{date} · {distance:.1} km · +{gain} m / -{loss} m</small></span>
        <span class="badge {level}">{difficulty}</span>
        <button data-day="{day}">{label}</button>
      </li>
"#,
        day = stage.day,
        from = escape_html(&stage.from),
        to = escape_html(&stage.to),
        date = escape_html(&stage.date),
        distance = stage.distance_km,
        gain = stage.elevation_gain_m,
        loss = stage.elevation_loss_m,
        level = difficulty_class(stage.difficulty),
        difficulty = stage.difficulty,
    )
}

fn difficulty_class(level: Difficulty) -> &'static str {
    match level {
        Difficulty::Simple => "simple",
        Difficulty::Moyenne => "moyenne",
        Difficulty::Difficile => "difficile",
        Difficulty::Repos => "repos",
        Difficulty::Transport => "transport",
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="fr">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>GR10 · Hendaye → Banyuls</title>
  <style>
    :root {
      --bg: #f4f1ea;
      --ink: #23302b;
      --accent: #2f6b4f;
      --muted: #7b857f;
      --card: rgba(255, 255, 255, 0.9);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      font-family: system-ui, sans-serif;
      background: linear-gradient(160deg, var(--bg), #dfe8dc);
      color: var(--ink);
    }

    main {
      max-width: 880px;
      margin: 0 auto;
      padding: 32px 20px 64px;
    }

    .summary {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(150px, 1fr));
      gap: 12px;
      margin-bottom: 24px;
    }

    .summary div,
    .stage {
      background: var(--card);
      border-radius: 12px;
      padding: 12px 16px;
    }

    .summary .value {
      display: block;
      font-size: 1.6rem;
      font-weight: 600;
    }

    .bar {
      height: 10px;
      border-radius: 5px;
      background: #cfd8cc;
      overflow: hidden;
      margin-bottom: 24px;
    }

    .bar span {
      display: block;
      height: 100%;
      background: var(--accent);
    }

    ul {
      list-style: none;
      padding: 0;
      display: grid;
      gap: 8px;
    }

    .stage {
      display: grid;
      grid-template-columns: 48px 1fr auto auto;
      align-items: center;
      gap: 12px;
    }

    .stage small {
      display: block;
      color: var(--muted);
    }

    .stage.done {
      opacity: 0.7;
    }

    .stage.locked button {
      cursor: not-allowed;
    }

    .badge {
      font-size: 0.8rem;
      padding: 2px 8px;
      border-radius: 999px;
      background: #e7ece5;
    }

    .badge.difficile {
      background: #f3c7bd;
    }

    .badge.repos,
    .badge.transport {
      background: #d7e3f0;
    }

    button {
      border: 0;
      border-radius: 8px;
      padding: 6px 12px;
      background: var(--accent);
      color: white;
    }

    #status {
      min-height: 1.4em;
      color: #a33b2b;
    }
  </style>
</head>
<body>
  <main>
    <h1>GR10 · Hendaye → Banyuls</h1>
    <section class="summary">
      <div><span class="value">{{COMPLETED}} / {{TOTAL}}</span>étapes</div>
      <div><span class="value">{{PERCENT}} %</span>parcouru</div>
      <div><span class="value">{{DISTANCE}} km</span>distance</div>
      <div><span class="value">+{{GAIN}} m</span>dénivelé</div>
      <div><span class="value">J{{NEXT}}</span>prochaine étape</div>
    </section>
    <div class="bar"><span style="width: {{PERCENT}}%"></span></div>
    <p id="status"></p>
    <ul id="stages">
      {{ROWS}}
    </ul>
  </main>

  <script>
    const status = document.getElementById('status');

    document.getElementById('stages').addEventListener('click', async (event) => {
      const button = event.target.closest('button[data-day]');
      if (!button) {
        return;
      }
      const res = await fetch(`/api/progress/${button.dataset.day}/toggle`, { method: 'POST' });
      if (!res.ok) {
        status.textContent = await res.text();
        return;
      }
      window.location.reload();
    });
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_stages;
    use crate::models::ProgressStats;

    #[test]
    fn page_marks_done_and_next_stages() {
        let progress = ProgressResponse {
            completed_days: vec![1],
            next_eligible_day: 2,
            stats: ProgressStats {
                completed: 1,
                remaining: 3,
                total: 4,
                percentage: 25,
                cumulative_distance_km: 15.0,
                cumulative_elevation_gain_m: 850,
                cumulative_elevation_loss_m: 450,
            },
        };
        let html = render_index(&progress, &sample_stages());
        assert!(html.contains("1 / 4"));
        assert!(html.contains("width: 25%"));
        assert!(html.contains(r#"<li class="stage done">"#));
        assert!(html.contains(r#"<li class="stage next">"#));
        assert!(html.contains("Olhette → Aïnhoa"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn markup_is_escaped() {
        assert_eq!(
            escape_html(r#"<b>"Col d'Ibañeta" & co</b>"#),
            "&lt;b&gt;&quot;Col d&#39;Ibañeta&quot; &amp; co&lt;/b&gt;"
        );
    }
}
