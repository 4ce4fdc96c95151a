use super::*;

fn span(first: Time, last: Time) -> FrameSpan {
    FrameSpan {
        first,
        last,
        view: ViewIdx(0),
    }
}

fn domain(first: Time, last: Time) -> TimeDomain {
    TimeDomain { first, last }
}

#[test]
fn finite_span_steps_by_one() {
    let frames: Vec<Time> = span(2.0, 4.5).frames().collect();
    assert_eq!(frames, vec![2.0, 3.0, 4.0]);
    assert_eq!(span(3.0, 1.0).frames().count(), 0);
}

#[test]
fn unbounded_span_yields_nothing() {
    assert_eq!(span(0.0, f64::INFINITY).frames().count(), 0);
    assert_eq!(span(f64::NEG_INFINITY, 0.0).frames().count(), 0);
    assert_eq!(span(f64::NAN, 1.0).frames().count(), 0);
}

#[test]
fn unbounded_span_is_bounded_by_the_domain() {
    let frames: Vec<Time> = span(0.0, f64::INFINITY)
        .within(domain(0.0, 3.0))
        .frames()
        .collect();
    assert_eq!(frames, vec![0.0, 1.0, 2.0, 3.0]);

    let all = span(f64::NEG_INFINITY, f64::INFINITY).within(domain(5.0, 6.0));
    assert_eq!(all.frames().count(), 2);
}

#[test]
fn span_outside_the_domain_collapses_to_its_nearest_frame() {
    assert_eq!(span(10.0, 12.0).within(domain(0.0, 5.0)), FrameSpan::single(10.0, ViewIdx(0)));
    assert_eq!(span(-4.0, -2.0).within(domain(0.0, 5.0)), FrameSpan::single(-2.0, ViewIdx(0)));
    assert_eq!(
        span(10.0, f64::INFINITY).within(domain(0.0, 5.0)),
        FrameSpan::single(10.0, ViewIdx(0))
    );
}

#[test]
fn unbounded_domain_leaves_finite_spans_alone() {
    assert_eq!(span(1.0, 3.0).within(TimeDomain::UNBOUNDED), span(1.0, 3.0));
}
